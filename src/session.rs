use std::error::Error;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::codec::{Capability, CodecError, Message, MessageCodec, MessageProtocol, OpenMessage};
use crate::config::Config;
use crate::metrics::MetricsSink;
use crate::rib::RouteTable;
use crate::utils::{asn_to_dotted, format_time_as_elapsed};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SessionState {
    AwaitingOpen,
    Established,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            SessionState::AwaitingOpen => "AwaitingOpen",
            SessionState::Established => "Established",
            SessionState::Closed => "Closed",
        };
        write!(f, "{}", word)
    }
}

#[derive(Debug)]
pub enum SessionError {
    /// Framing or body decode failed; resynchronizing mid-stream is not
    /// attempted
    Codec(CodecError),
    /// Peer sent NOTIFICATION. [raw body]
    Notification(Vec<u8>),
    /// Peer closed the connection
    Disconnected,
    /// Message arrived in a state that cannot accept it [message, state]
    FiniteStateMachine(&'static str, SessionState),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use SessionError::*;
        match self {
            Codec(err) => write!(f, "Codec error: {}", err),
            Notification(body) => write!(f, "Notification received: {:02x?}", body),
            Disconnected => write!(f, "Peer disconnected"),
            FiniteStateMachine(kind, state) => {
                write!(f, "Unexpected {} in state {}", kind, state)
            }
        }
    }
}

impl Error for SessionError {}

impl From<CodecError> for SessionError {
    fn from(error: CodecError) -> Self {
        SessionError::Codec(error)
    }
}

/// One accepted BGP peering: drives the handshake, dispatches decoded
/// messages, and owns the peer's route table.
///
/// `AwaitingOpen -> Established -> Closed`; `Closed` is terminal, a
/// reconnecting peer gets a fresh session. Route-table teardown and the
/// live-connection gauge are handled in `Drop` so they run on every
/// exit path.
pub struct Session<S> {
    pub(crate) addr: IpAddr,
    pub(crate) state: SessionState,
    pub(crate) peer_asn: u32,
    pub(crate) peer_router_id: Option<IpAddr>,
    pub(crate) peer_hold_time: u16,
    pub(crate) four_byte_asn: bool,
    pub(crate) config: Arc<Config>,
    pub(crate) protocol: MessageProtocol<S>,
    pub(crate) connect_time: DateTime<Utc>,
    pub(crate) routes: RouteTable,
    metrics: Arc<dyn MetricsSink>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: IpAddr,
        config: Arc<Config>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        metrics.connection_opened();
        Self {
            addr,
            state: SessionState::AwaitingOpen,
            peer_asn: 0,
            peer_router_id: None,
            peer_hold_time: 0,
            four_byte_asn: false,
            routes: RouteTable::new(addr, config.delete_on_disconnect, Arc::clone(&metrics)),
            config,
            protocol: Framed::new(stream, MessageCodec::new()),
            connect_time: Utc::now(),
            metrics,
        }
    }

    fn update_state(&mut self, new_state: SessionState) {
        debug!("{} went from {} to {}", self.addr, self.state, new_state);
        self.state = new_state;
    }

    /// Drive the session until it closes. One read-decode-dispatch
    /// cycle at a time; messages are handled strictly in arrival order.
    ///
    /// There is no read timeout: hold-timer expiry is not enforced, so
    /// a silent peer keeps its task parked here indefinitely.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        loop {
            let result = match self.protocol.next().await {
                None => Err(SessionError::Disconnected),
                Some(Err(err)) => Err(SessionError::Codec(err)),
                Some(Ok(message)) => {
                    trace!("[{}] Incoming: {}", self.addr, message.kind());
                    match self.process_message(message) {
                        Ok(Some(reply)) => self.send_message(reply).await,
                        other => other.map(|_| ()),
                    }
                }
            };
            if let Err(err) = result {
                self.update_state(SessionState::Closed);
                return Err(err);
            }
        }
    }

    /// Apply one message to the state machine, producing the reply to
    /// send (if any)
    fn process_message(&mut self, message: Message) -> Result<Option<Message>, SessionError> {
        match message {
            Message::Open(open) => match self.state {
                SessionState::AwaitingOpen => {
                    self.receive_open(open);
                    let reply = OpenMessage::new(self.config.asn, self.config.router_id);
                    self.update_state(SessionState::Established);
                    Ok(Some(Message::Open(reply)))
                }
                state => Err(SessionError::FiniteStateMachine("OPEN", state)),
            },
            Message::KeepAlive => match self.state {
                SessionState::Established => {
                    debug!("[{}] Keepalive received", self.addr);
                    Ok(Some(Message::KeepAlive))
                }
                state => Err(SessionError::FiniteStateMachine("KEEPALIVE", state)),
            },
            Message::Update(update) => match self.state {
                SessionState::Established => {
                    debug!("[{}] Update received", self.addr);
                    if update.has_empty_as_path() {
                        // Not worth dropping the UPDATE; routes get an
                        // empty path
                        warn!("[{}] AS_PATH attribute with empty value", self.addr);
                    }
                    self.routes.apply_update(&update);
                    Ok(None)
                }
                state => Err(SessionError::FiniteStateMachine("UPDATE", state)),
            },
            // NOTIFICATION ends the session from any state
            Message::Notification(body) => Err(SessionError::Notification(body)),
            Message::RouteRefresh(body) => match self.state {
                SessionState::Established => {
                    debug!(
                        "[{}] Route refresh received ({} bytes), not supported",
                        self.addr,
                        body.len()
                    );
                    Ok(None)
                }
                state => Err(SessionError::FiniteStateMachine("ROUTEREFRESH", state)),
            },
        }
    }

    /// Record the peer's identity and capabilities. The ASN field width
    /// for this session's UPDATEs is fixed here, at OPEN time.
    fn receive_open(&mut self, open: OpenMessage) {
        self.peer_asn = u32::from(open.asn);
        self.peer_hold_time = open.hold_time;
        self.peer_router_id = Some(IpAddr::V4(open.router_id));
        for capability in &open.capabilities {
            match capability {
                Capability::FourByteAsn(asn) => {
                    self.four_byte_asn = true;
                    self.peer_asn = *asn;
                    self.protocol.codec_mut().four_byte_asn = true;
                    debug!("[{}] Supports 4-byte ASNs", self.addr);
                }
                Capability::RouteRefresh => {
                    debug!("[{}] Supports route refresh", self.addr);
                }
                Capability::MultiProtocol(value) => {
                    debug!("[{}] Supports multiprotocol: {:02x?}", self.addr, value);
                }
                Capability::Other(kind, _) => {
                    debug!("[{}] Unsupported capability {}", self.addr, kind);
                }
            }
        }
        debug!(
            "[{}] Received OPEN [asn={} router_id={} hold_time={}]",
            self.addr,
            asn_to_dotted(self.peer_asn),
            open.router_id,
            open.hold_time,
        );
    }

    // Send a message, and flush the send buffer afterwards
    async fn send_message(&mut self, message: Message) -> Result<(), SessionError> {
        trace!("[{}] Outgoing: {}", self.addr, message.kind());
        self.protocol.send(message).await?;
        Ok(())
    }
}

impl<S> fmt::Display for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Session {} asn={} state={} uptime={} routes={}>",
            self.addr,
            asn_to_dotted(self.peer_asn),
            self.state,
            format_time_as_elapsed(self.connect_time),
            self.routes.len(),
        )
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        self.routes.teardown();
        self.metrics.connection_closed();
    }
}
