use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use log::{error, trace};
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Counter/gauge mutations made by the core. Sessions mutate these
/// concurrently from their own tasks; every operation is individually
/// atomic. One production implementation writes to the shared
/// prometheus registry, one recording implementation backs tests.
pub trait MetricsSink: Send + Sync {
    fn connection_opened(&self);
    fn connection_closed(&self);
    fn local_asn(&self, asn: u32);

    /// `bgp_route` presence gauge, labeled (peer, route, aspath)
    fn route_up(&self, peer: &str, route: &str, as_path: &str);
    fn route_down(&self, peer: &str, route: &str, as_path: &str);
    /// `bgp_route_changes` counter, labeled (peer, route, aspath)
    fn route_changed(&self, peer: &str, route: &str, as_path: &str);

    /// Per-peer count of routes currently in the table
    fn peer_routes_inc(&self, peer: &str);
    fn peer_routes_dec(&self, peer: &str);
    fn peer_routes_zero(&self, peer: &str);

    /// Drop the series entirely (delete-on-disconnect teardown)
    fn remove_route(&self, peer: &str, route: &str, as_path: &str);
    fn remove_peer_routes(&self, peer: &str);
}

/// Production sink: all series registered against one process-wide
/// `prometheus::Registry`, scraped over HTTP by `serve_metrics`
pub struct PromSink {
    connections_total: IntCounter,
    connections_alive: IntGauge,
    local_asn: IntCounterVec,
    routes: IntGaugeVec,
    route_changes: IntCounterVec,
    peer_routes: IntGaugeVec,
}

impl PromSink {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let connections_total = IntCounter::with_opts(Opts::new(
            "bgp_connections_total",
            "The total number of connections",
        ))?;
        let connections_alive = IntGauge::with_opts(Opts::new(
            "bgp_connections_alive",
            "The number of live connections",
        ))?;
        let local_asn = IntCounterVec::new(
            Opts::new("bgp_local_asn", "Local BGP ASN number"),
            &["asn"],
        )?;
        let routes = IntGaugeVec::new(
            Opts::new("bgp_route", "Route presence per peer, route and AS path"),
            &["peer", "route", "aspath"],
        )?;
        let route_changes = IntCounterVec::new(
            Opts::new(
                "bgp_route_changes",
                "Route change events per peer, route and AS path",
            ),
            &["peer", "route", "aspath"],
        )?;
        let peer_routes = IntGaugeVec::new(
            Opts::new("bgp_neighbour_routes", "Routes currently learned per peer"),
            &["peer"],
        )?;

        registry.register(Box::new(connections_total.clone()))?;
        registry.register(Box::new(connections_alive.clone()))?;
        registry.register(Box::new(local_asn.clone()))?;
        registry.register(Box::new(routes.clone()))?;
        registry.register(Box::new(route_changes.clone()))?;
        registry.register(Box::new(peer_routes.clone()))?;

        Ok(Self {
            connections_total,
            connections_alive,
            local_asn,
            routes,
            route_changes,
            peer_routes,
        })
    }
}

impl MetricsSink for PromSink {
    fn connection_opened(&self) {
        self.connections_total.inc();
        self.connections_alive.inc();
    }

    fn connection_closed(&self) {
        self.connections_alive.dec();
    }

    fn local_asn(&self, asn: u32) {
        self.local_asn.with_label_values(&[&asn.to_string()]).inc();
    }

    fn route_up(&self, peer: &str, route: &str, as_path: &str) {
        self.routes.with_label_values(&[peer, route, as_path]).inc();
    }

    fn route_down(&self, peer: &str, route: &str, as_path: &str) {
        self.routes.with_label_values(&[peer, route, as_path]).dec();
    }

    fn route_changed(&self, peer: &str, route: &str, as_path: &str) {
        self.route_changes
            .with_label_values(&[peer, route, as_path])
            .inc();
    }

    fn peer_routes_inc(&self, peer: &str) {
        self.peer_routes.with_label_values(&[peer]).inc();
    }

    fn peer_routes_dec(&self, peer: &str) {
        self.peer_routes.with_label_values(&[peer]).dec();
    }

    fn peer_routes_zero(&self, peer: &str) {
        self.peer_routes.with_label_values(&[peer]).set(0);
    }

    fn remove_route(&self, peer: &str, route: &str, as_path: &str) {
        // Removal of an already-removed series is fine
        let _ = self.routes.remove_label_values(&[peer, route, as_path]);
        let _ = self
            .route_changes
            .remove_label_values(&[peer, route, as_path]);
    }

    fn remove_peer_routes(&self, peer: &str) {
        let _ = self.peer_routes.remove_label_values(&[peer]);
    }
}

async fn metrics_response(req: Request<Body>, registry: Registry) -> Response<Body> {
    if req.method() != Method::GET || req.uri().path() != "/metrics" {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap_or_default();
    }
    trace!("Encoding metrics for scrape");
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&registry.gather(), &mut buffer) {
        Ok(()) => Response::builder()
            .header(CONTENT_TYPE, encoder.format_type())
            .body(Body::from(buffer))
            .unwrap_or_default(),
        Err(err) => {
            error!("Error encoding metrics: {}", err);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .unwrap_or_default()
        }
    }
}

/// Serve the registry's text exposition on `GET /metrics`
pub async fn serve_metrics(addr: SocketAddr, registry: Registry) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let registry = registry.clone();
                async move { Ok::<_, Infallible>(metrics_response(req, registry).await) }
            }))
        }
    });
    Server::bind(&addr).serve(make_svc).await
}

#[cfg(test)]
pub(crate) use recording::RecordingSink;

#[cfg(test)]
mod recording {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::MetricsSink;

    type Series = (String, String, String);

    /// In-memory sink recording every mutation, for asserting on the
    /// route-table metric rules without a registry
    #[derive(Default)]
    pub struct RecordingSink {
        pub state: Mutex<RecordedState>,
    }

    #[derive(Default)]
    pub struct RecordedState {
        pub connections_total: u64,
        pub connections_alive: i64,
        pub local_asn: Option<u32>,
        pub route_gauges: HashMap<Series, i64>,
        pub route_changes: HashMap<Series, u64>,
        pub peer_routes: HashMap<String, i64>,
        pub removed_routes: HashSet<Series>,
        pub removed_peers: HashSet<String>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route_gauge(&self, peer: &str, route: &str, as_path: &str) -> Option<i64> {
            self.state
                .lock()
                .unwrap()
                .route_gauges
                .get(&series(peer, route, as_path))
                .copied()
        }

        pub fn route_change_count(&self, peer: &str, route: &str, as_path: &str) -> u64 {
            self.state
                .lock()
                .unwrap()
                .route_changes
                .get(&series(peer, route, as_path))
                .copied()
                .unwrap_or(0)
        }

        pub fn peer_route_count(&self, peer: &str) -> Option<i64> {
            self.state.lock().unwrap().peer_routes.get(peer).copied()
        }

        pub fn route_removed(&self, peer: &str, route: &str, as_path: &str) -> bool {
            self.state
                .lock()
                .unwrap()
                .removed_routes
                .contains(&series(peer, route, as_path))
        }
    }

    fn series(peer: &str, route: &str, as_path: &str) -> Series {
        (peer.to_string(), route.to_string(), as_path.to_string())
    }

    impl MetricsSink for RecordingSink {
        fn connection_opened(&self) {
            let mut state = self.state.lock().unwrap();
            state.connections_total += 1;
            state.connections_alive += 1;
        }

        fn connection_closed(&self) {
            self.state.lock().unwrap().connections_alive -= 1;
        }

        fn local_asn(&self, asn: u32) {
            self.state.lock().unwrap().local_asn = Some(asn);
        }

        fn route_up(&self, peer: &str, route: &str, as_path: &str) {
            *self
                .state
                .lock()
                .unwrap()
                .route_gauges
                .entry(series(peer, route, as_path))
                .or_insert(0) += 1;
        }

        fn route_down(&self, peer: &str, route: &str, as_path: &str) {
            *self
                .state
                .lock()
                .unwrap()
                .route_gauges
                .entry(series(peer, route, as_path))
                .or_insert(0) -= 1;
        }

        fn route_changed(&self, peer: &str, route: &str, as_path: &str) {
            *self
                .state
                .lock()
                .unwrap()
                .route_changes
                .entry(series(peer, route, as_path))
                .or_insert(0) += 1;
        }

        fn peer_routes_inc(&self, peer: &str) {
            *self
                .state
                .lock()
                .unwrap()
                .peer_routes
                .entry(peer.to_string())
                .or_insert(0) += 1;
        }

        fn peer_routes_dec(&self, peer: &str) {
            *self
                .state
                .lock()
                .unwrap()
                .peer_routes
                .entry(peer.to_string())
                .or_insert(0) -= 1;
        }

        fn peer_routes_zero(&self, peer: &str) {
            self.state
                .lock()
                .unwrap()
                .peer_routes
                .insert(peer.to_string(), 0);
        }

        fn remove_route(&self, peer: &str, route: &str, as_path: &str) {
            let mut state = self.state.lock().unwrap();
            let series = series(peer, route, as_path);
            state.route_gauges.remove(&series);
            state.route_changes.remove(&series);
            state.removed_routes.insert(series);
        }

        fn remove_peer_routes(&self, peer: &str) {
            let mut state = self.state.lock().unwrap();
            state.peer_routes.remove(peer);
            state.removed_peers.insert(peer.to_string());
        }
    }
}
