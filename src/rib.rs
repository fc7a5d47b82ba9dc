use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use itertools::Itertools;
use log::trace;

use crate::codec::{Prefix, UpdateMessage};
use crate::metrics::MetricsSink;

/// Render an AS path the way it appears in metric labels:
/// underscore-joined ASNs, empty string for an empty path
pub fn format_as_path(path: &[u32]) -> String {
    path.iter().join("_")
}

/// Per-peer adjacency view: the prefixes this peer currently advertises
/// and the AS path each was last advertised with.
///
/// Owned exclusively by the peer's session task, so no locking; only
/// the shared metrics sink is touched concurrently.
pub struct RouteTable {
    peer: IpAddr,
    delete_on_disconnect: bool,
    routes: HashMap<Prefix, String>,
    metrics: Arc<dyn MetricsSink>,
}

impl RouteTable {
    pub fn new(peer: IpAddr, delete_on_disconnect: bool, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            peer,
            delete_on_disconnect,
            routes: HashMap::new(),
            metrics,
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Fold one UPDATE into the table, emitting the metric deltas for
    /// every advertised and withdrawn route
    pub fn apply_update(&mut self, update: &UpdateMessage) {
        let peer = self.peer.to_string();
        let as_path = format_as_path(&update.as_path);

        for prefix in &update.nlri {
            let route = prefix.to_string();
            if let Some(existing) = self.routes.get(prefix) {
                // Re-advertisement: retire the old series, count a change
                self.metrics.route_down(&peer, &route, existing);
            } else {
                self.metrics.peer_routes_inc(&peer);
            }
            self.routes.insert(prefix.clone(), as_path.clone());
            self.metrics.route_up(&peer, &route, &as_path);
            self.metrics.route_changed(&peer, &route, &as_path);
            trace!("[{}] Route {} via {}", peer, route, as_path);
        }

        for prefix in &update.withdrawn_routes {
            // Withdrawing a prefix we never learned is a no-op
            if let Some(existing) = self.routes.remove(prefix) {
                let route = prefix.to_string();
                self.metrics.route_down(&peer, &route, &existing);
                self.metrics.route_changed(&peer, &route, &existing);
                self.metrics.peer_routes_dec(&peer);
                trace!("[{}] Route {} withdrawn", peer, route);
            }
        }
    }

    /// Retire every remaining entry when the session closes. With
    /// delete-on-disconnect the series disappear from the registry;
    /// otherwise they stay visible at zero.
    ///
    /// Draining makes a second call a no-op, so running this from a
    /// drop guard is safe.
    pub fn teardown(&mut self) {
        let peer = self.peer.to_string();
        let had_routes = !self.routes.is_empty();
        for (prefix, as_path) in self.routes.drain() {
            let route = prefix.to_string();
            if self.delete_on_disconnect {
                self.metrics.remove_route(&peer, &route, &as_path);
            } else {
                self.metrics.route_changed(&peer, &route, &as_path);
                self.metrics.route_down(&peer, &route, &as_path);
            }
        }
        if had_routes {
            if self.delete_on_disconnect {
                self.metrics.remove_peer_routes(&peer);
            } else {
                self.metrics.peer_routes_zero(&peer);
            }
        }
    }
}
