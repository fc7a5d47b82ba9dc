use std::error::Error;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use env_logger::Builder;
use log::{debug, error, info, LevelFilter};
use prometheus::Registry;

use bgp_exporter::{serve, serve_metrics, Config, MetricsSink, PromSink};

#[derive(Parser, Debug)]
#[clap(name = "bgp-exporter", rename_all = "kebab-case")]
/// Passive BGP speaker that exports learned routes as Prometheus metrics
pub struct Args {
    /// Path to a config.toml (built-in defaults apply when omitted)
    config_path: Option<String>,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences))]
    pub verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let (own_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("bgp_exporter"), own_level)
        .filter(None, other_level)
        .init();
    info!("Logging at levels {}/{}", own_level, other_level);

    let config = Arc::new(match &args.config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    });
    debug!("Running with {}", config);

    let registry = Registry::new();
    let sink: Arc<dyn MetricsSink> = Arc::new(PromSink::register(&registry)?);
    sink.local_asn(config.asn);

    let metrics_socket = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.metrics_port));
    info!("Serving metrics on http://{}/metrics", metrics_socket);
    tokio::spawn(async move {
        if let Err(err) = serve_metrics(metrics_socket, registry).await {
            error!("Metrics server crashed: {}", err);
        }
    });

    tokio::select! {
        result = serve(config, sink) => result?,
        _ = tokio::signal::ctrl_c() => info!("Stopping bgp-exporter..."),
    }
    Ok(())
}
