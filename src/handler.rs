use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::metrics::MetricsSink;
use crate::session::{Session, SessionError};

/// BGP always listens on its well-known port
pub const BGP_PORT: u16 = 179;

/// Bind the BGP listener and accept sessions until the process exits.
///
/// Every accepted connection gets its own task; sessions never talk to
/// each other, only to the shared metrics sink.
pub async fn serve(config: Arc<Config>, metrics: Arc<dyn MetricsSink>) -> io::Result<()> {
    let socket = SocketAddr::from((config.listen_addr, BGP_PORT));
    let listener = TcpListener::bind(socket).await?;
    info!("Listening on {}", socket);

    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                debug!("Incoming new connection from {}", remote);
                let config = Arc::clone(&config);
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    handle_connection(stream, remote.ip(), config, metrics).await;
                });
            }
            Err(err) => error!("Error accepting connection: {}", err),
        }
    }
}

/// Run one session to completion. The session's `Drop` settles the
/// route table and connection gauge, so every exit path tears down.
async fn handle_connection(
    stream: TcpStream,
    addr: IpAddr,
    config: Arc<Config>,
    metrics: Arc<dyn MetricsSink>,
) {
    info!("[{}] New connection", addr);
    let mut session = Session::new(stream, addr, config, metrics);
    match session.run().await {
        Ok(()) => {}
        Err(SessionError::Notification(body)) => {
            warn!("[{}] Notification received: {:02x?}", addr, body)
        }
        Err(err) => warn!("[{}] Session ended: {}", addr, err),
    }
    debug!("Closing {}", session);
    info!("[{}] Close connection", addr);
}
