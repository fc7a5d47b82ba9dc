mod codec;
mod config;
mod handler;
mod metrics;
mod rib;
mod session;
mod utils;

pub use config::Config;
pub use handler::{serve, BGP_PORT};
pub use metrics::{serve_metrics, MetricsSink, PromSink};
