mod open;
mod prefix;
mod tlv;
mod update;

pub use open::{Capability, OpenMessage};
pub use prefix::Prefix;
pub use tlv::Tlv;
pub use update::{parse_as_path, PathAttribute, UpdateMessage, ATTR_AS_PATH};

use std::error::Error;
use std::fmt;
use std::io;

use byteorder::{ByteOrder, NetworkEndian};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, Framed};

/// A framed BGP transport over any byte stream
pub type MessageProtocol<S> = Framed<S, MessageCodec>;

pub const MARKER: [u8; 16] = [0xff; 16];
pub const HEADER_LENGTH: usize = 19;
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Sentinel ASN carried in the 16-bit OPEN field when the real ASN
/// needs four bytes (RFC 6793)
pub const AS_TRANS: u16 = 23456;

const MSG_OPEN: u8 = 1;
const MSG_UPDATE: u8 = 2;
const MSG_NOTIFICATION: u8 = 3;
const MSG_KEEPALIVE: u8 = 4;
const MSG_ROUTE_REFRESH: u8 = 5;

/// A fully decoded BGP message. NOTIFICATION and ROUTE-REFRESH bodies
/// are opaque to the codec and kept raw for logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Open(OpenMessage),
    Update(UpdateMessage),
    Notification(Vec<u8>),
    KeepAlive,
    RouteRefresh(Vec<u8>),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Open(_) => "OPEN",
            Message::Update(_) => "UPDATE",
            Message::Notification(_) => "NOTIFICATION",
            Message::KeepAlive => "KEEPALIVE",
            Message::RouteRefresh(_) => "ROUTEREFRESH",
        }
    }

    fn type_code(&self) -> u8 {
        match self {
            Message::Open(_) => MSG_OPEN,
            Message::Update(_) => MSG_UPDATE,
            Message::Notification(_) => MSG_NOTIFICATION,
            Message::KeepAlive => MSG_KEEPALIVE,
            Message::RouteRefresh(_) => MSG_ROUTE_REFRESH,
        }
    }

    fn body(&self) -> Vec<u8> {
        let mut body = Vec::new();
        match self {
            Message::Open(open) => open.encode(&mut body),
            Message::Update(update) => update.encode(&mut body),
            Message::Notification(data) | Message::RouteRefresh(data) => {
                body.extend_from_slice(data)
            }
            Message::KeepAlive => {}
        }
        body
    }
}

#[derive(Debug)]
pub enum CodecError {
    /// Header marker was not 16 bytes of 0xFF; the stream cannot be
    /// resynchronized
    BadMarker,
    /// Declared message length outside [19, 4096]
    BadLength(u16),
    /// Unknown message type code
    BadMessageType(u8),
    /// OPEN version other than 4
    UnsupportedVersion(u8),
    /// Prefix length above 32
    BadPrefixLength(u8),
    /// A declared length overran the remaining bytes. [field]
    Truncated(&'static str),
    Io(io::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use CodecError::*;
        match self {
            BadMarker => write!(f, "header marker is not all-ones"),
            BadLength(length) => write!(f, "invalid message length {}", length),
            BadMessageType(code) => write!(f, "unknown message type {}", code),
            UnsupportedVersion(version) => write!(f, "unsupported BGP version {}", version),
            BadPrefixLength(length) => write!(f, "invalid prefix length {}", length),
            Truncated(field) => write!(f, "truncated {}", field),
            Io(err) => write!(f, "{}", err),
        }
    }
}

impl Error for CodecError {}

impl From<io::Error> for CodecError {
    fn from(error: io::Error) -> Self {
        CodecError::Io(error)
    }
}

/// Framing codec for BGP messages: fixed 19-byte header (marker,
/// length, type) followed by a type-specific body.
///
/// AS_PATH field width depends on the four-byte-ASN capability
/// negotiated at OPEN time, so the session flips `four_byte_asn` once
/// for its lifetime after the peer's OPEN is processed.
#[derive(Debug, Default)]
pub struct MessageCodec {
    pub four_byte_asn: bool,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        if buf.len() < HEADER_LENGTH {
            return Ok(None);
        }
        if buf[..16] != MARKER {
            return Err(CodecError::BadMarker);
        }
        let length = NetworkEndian::read_u16(&buf[16..18]);
        if usize::from(length) < HEADER_LENGTH || usize::from(length) > MAX_MESSAGE_LENGTH {
            return Err(CodecError::BadLength(length));
        }
        if buf.len() < usize::from(length) {
            // Body still in flight
            return Ok(None);
        }
        let body = &buf[HEADER_LENGTH..usize::from(length)];
        let message = match buf[18] {
            MSG_OPEN => Message::Open(OpenMessage::parse(body)?),
            MSG_UPDATE => Message::Update(UpdateMessage::parse(body, self.four_byte_asn)?),
            MSG_NOTIFICATION => Message::Notification(body.to_vec()),
            MSG_KEEPALIVE => Message::KeepAlive,
            MSG_ROUTE_REFRESH => Message::RouteRefresh(body.to_vec()),
            code => return Err(CodecError::BadMessageType(code)),
        };
        buf.advance(usize::from(length));
        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, message: Message, buf: &mut BytesMut) -> Result<(), CodecError> {
        let body = message.body();
        buf.reserve(HEADER_LENGTH + body.len());
        buf.put_slice(&MARKER);
        buf.put_u16((HEADER_LENGTH + body.len()) as u16);
        buf.put_u8(message.type_code());
        buf.put_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(type_code: u8, body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_slice(&MARKER);
        buf.put_u16((HEADER_LENGTH + body.len()) as u16);
        buf.put_u8(type_code);
        buf.put_slice(body);
        buf
    }

    #[test]
    fn test_decode_waits_for_full_message() {
        let mut codec = MessageCodec::new();
        let full = frame(MSG_KEEPALIVE, &[]);

        // Partial header
        let mut buf = BytesMut::from(&full[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // Full message decodes and drains the buffer
        let mut buf = full;
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::KeepAlive));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_waits_for_body() {
        let mut codec = MessageCodec::new();
        let full = frame(MSG_UPDATE, &[0x00, 0x00, 0x00, 0x00, 0x18, 0xc0, 0xa8, 0x00]);
        let mut buf = BytesMut::from(&full[..HEADER_LENGTH + 3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_bad_marker() {
        let mut buf = frame(MSG_KEEPALIVE, &[]);
        buf[0] = 0x00;
        assert!(matches!(
            MessageCodec::new().decode(&mut buf),
            Err(CodecError::BadMarker)
        ));
    }

    #[test]
    fn test_decode_bad_length() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MARKER);
        buf.put_u16(5); // below the header size
        buf.put_u8(MSG_KEEPALIVE);
        assert!(matches!(
            MessageCodec::new().decode(&mut buf),
            Err(CodecError::BadLength(5))
        ));
    }

    #[test]
    fn test_decode_bad_message_type() {
        let mut buf = frame(9, &[]);
        assert!(matches!(
            MessageCodec::new().decode(&mut buf),
            Err(CodecError::BadMessageType(9))
        ));
    }

    #[test]
    fn test_decode_consecutive_messages() {
        let mut codec = MessageCodec::new();
        let mut buf = frame(MSG_KEEPALIVE, &[]);
        buf.extend_from_slice(&frame(MSG_NOTIFICATION, &[6, 3]));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::KeepAlive));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Message::Notification(vec![6, 3]))
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_encode_keepalive_is_header_only() {
        let mut buf = BytesMut::new();
        MessageCodec::new()
            .encode(Message::KeepAlive, &mut buf)
            .unwrap();
        assert_eq!(buf.len(), HEADER_LENGTH);
        assert_eq!(&buf[..16], &MARKER);
        assert_eq!(NetworkEndian::read_u16(&buf[16..18]), 19);
        assert_eq!(buf[18], MSG_KEEPALIVE);
    }

    #[test]
    fn test_codec_gates_as_path_width() {
        let body = [
            0x00, 0x00, // no withdrawn routes
            0x00, 0x09, // attribute bytes
            0x40, 0x02, 0x06, // AS_PATH, length 6
            0x02, 0x01, 0x00, 0x01, 0x11, 0x70, // one four-byte ASN
        ];
        let mut wide = MessageCodec::new();
        wide.four_byte_asn = true;
        let mut buf = frame(MSG_UPDATE, &body);
        match wide.decode(&mut buf).unwrap() {
            Some(Message::Update(update)) => assert_eq!(update.as_path, vec![70000]),
            other => panic!("expected UPDATE, got {:?}", other),
        }

        let mut buf = frame(MSG_UPDATE, &body);
        match MessageCodec::new().decode(&mut buf).unwrap() {
            Some(Message::Update(update)) => assert_eq!(update.as_path, vec![1]),
            other => panic!("expected UPDATE, got {:?}", other),
        }
    }
}
