use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

use super::tlv::Tlv;
use super::{CodecError, AS_TRANS};

/// OPEN optional parameter carrying capability sub-TLVs
pub const PARAM_CAPABILITIES: u8 = 0x02;

pub const CAP_MULTIPROTOCOL: u8 = 0x01;
pub const CAP_ROUTE_REFRESH: u8 = 0x02;
pub const CAP_FOUR_BYTE_ASN: u8 = 0x41;

/// Multiprotocol capability value for IPv4 unicast (AFI 1 / SAFI 1)
const MP_IPV4_UNICAST: [u8; 4] = [0x00, 0x01, 0x00, 0x01];

/// Hold time advertised in every OPEN we send. Not enforced: this
/// speaker neither sends periodic keepalives nor tears down silent
/// sessions, it only echoes the peer's KEEPALIVEs.
pub const HOLD_TIME: u16 = 180;

const OPEN_FIXED_LENGTH: usize = 10;

/// One capability parsed from (or encoded into) an OPEN's capability
/// option. Only the four-byte-ASN capability changes session behavior;
/// the rest are noted in logs when received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Capability {
    MultiProtocol(Vec<u8>),
    RouteRefresh,
    FourByteAsn(u32),
    Other(u8, Vec<u8>),
}

impl Capability {
    fn from_tlv(tlv: Tlv) -> Result<Self, CodecError> {
        let capability = match tlv.kind {
            CAP_MULTIPROTOCOL => Capability::MultiProtocol(tlv.value),
            CAP_ROUTE_REFRESH => Capability::RouteRefresh,
            CAP_FOUR_BYTE_ASN => {
                if tlv.value.len() < 4 {
                    return Err(CodecError::Truncated("four-byte ASN capability"));
                }
                Capability::FourByteAsn(NetworkEndian::read_u32(&tlv.value))
            }
            kind => Capability::Other(kind, tlv.value),
        };
        Ok(capability)
    }

    fn to_tlv(&self) -> Tlv {
        match self {
            Capability::MultiProtocol(value) => Tlv::new(CAP_MULTIPROTOCOL, value.clone()),
            Capability::RouteRefresh => Tlv::new(CAP_ROUTE_REFRESH, vec![]),
            Capability::FourByteAsn(asn) => Tlv::new(CAP_FOUR_BYTE_ASN, asn.to_be_bytes().to_vec()),
            Capability::Other(kind, value) => Tlv::new(*kind, value.clone()),
        }
    }
}

/// BGP OPEN body: fixed fields plus the capabilities collected from the
/// option TLVs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenMessage {
    pub version: u8,
    pub asn: u16,
    pub hold_time: u16,
    pub router_id: Ipv4Addr,
    pub capabilities: Vec<Capability>,
}

impl OpenMessage {
    /// Build the OPEN this speaker sends: version 4, the fixed hold
    /// time, and two capabilities (multiprotocol IPv4 unicast and the
    /// four-byte local ASN).
    ///
    /// An ASN above the 16-bit range goes out as AS_TRANS in the fixed
    /// field; the true value is only carried in the capability.
    pub fn new(local_asn: u32, router_id: Ipv4Addr) -> Self {
        let asn = if local_asn > u32::from(u16::MAX) {
            AS_TRANS
        } else {
            local_asn as u16
        };
        Self {
            version: 4,
            asn,
            hold_time: HOLD_TIME,
            router_id,
            capabilities: vec![
                Capability::MultiProtocol(MP_IPV4_UNICAST.to_vec()),
                Capability::FourByteAsn(local_asn),
            ],
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < OPEN_FIXED_LENGTH {
            return Err(CodecError::Truncated("OPEN fixed fields"));
        }
        let version = buf[0];
        if version != 4 {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let asn = NetworkEndian::read_u16(&buf[1..3]);
        let hold_time = NetworkEndian::read_u16(&buf[3..5]);
        let router_id = Ipv4Addr::new(buf[5], buf[6], buf[7], buf[8]);
        let opt_len = usize::from(buf[9]);
        if buf.len() < OPEN_FIXED_LENGTH + opt_len {
            return Err(CodecError::Truncated("OPEN optional parameters"));
        }

        let mut capabilities = Vec::new();
        for param in Tlv::parse_all(&buf[OPEN_FIXED_LENGTH..OPEN_FIXED_LENGTH + opt_len])? {
            // Other parameter types (e.g. deprecated authentication) are
            // skipped here; the session logs them as unsupported
            if param.kind == PARAM_CAPABILITIES {
                for tlv in Tlv::parse_all(&param.value)? {
                    capabilities.push(Capability::from_tlv(tlv)?);
                }
            }
        }
        Ok(Self {
            version,
            asn,
            hold_time,
            router_id,
            capabilities,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut caps = Vec::new();
        for capability in &self.capabilities {
            capability.to_tlv().encode(&mut caps);
        }
        let mut params = Vec::new();
        Tlv::new(PARAM_CAPABILITIES, caps).encode(&mut params);

        buf.push(self.version);
        buf.extend_from_slice(&self.asn.to_be_bytes());
        buf.extend_from_slice(&self.hold_time.to_be_bytes());
        buf.extend_from_slice(&self.router_id.octets());
        buf.push(params.len() as u8);
        buf.extend_from_slice(&params);
    }

    /// Effective peer ASN: the four-byte capability wins over the
    /// 16-bit fixed field
    pub fn effective_asn(&self) -> u32 {
        self.four_byte_asn().unwrap_or_else(|| u32::from(self.asn))
    }

    pub fn four_byte_asn(&self) -> Option<u32> {
        self.capabilities.iter().find_map(|c| match c {
            Capability::FourByteAsn(asn) => Some(*asn),
            _ => None,
        })
    }
}
