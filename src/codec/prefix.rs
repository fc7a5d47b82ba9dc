use std::fmt;
use std::net::Ipv4Addr;

use super::CodecError;

/// One IPv4 NLRI entry as carried on the wire: a prefix length and the
/// minimal number of significant octets (`ceil(length / 8)`).
///
/// Only the significant octets are stored; padding out to four octets
/// is a display concern, handled by the `Display` impl.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Prefix {
    pub length: u8,
    pub octets: Vec<u8>,
}

impl Prefix {
    pub fn new(length: u8, octets: Vec<u8>) -> Self {
        Self { length, octets }
    }

    /// Number of wire octets needed for a given prefix length
    fn wire_octets(length: u8) -> usize {
        (usize::from(length) + 7) / 8
    }

    /// Parse a single prefix record at the start of `buf`,
    /// returning the prefix and the number of bytes consumed
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let length = *buf.first().ok_or(CodecError::Truncated("prefix length"))?;
        if length > 32 {
            return Err(CodecError::BadPrefixLength(length));
        }
        let count = Self::wire_octets(length);
        if buf.len() < 1 + count {
            return Err(CodecError::Truncated("prefix octets"));
        }
        Ok((Self::new(length, buf[1..1 + count].to_vec()), 1 + count))
    }

    /// Parse prefix records until the end of the buffer.
    ///
    /// NLRI and withdrawn-route lists carry no record count; the
    /// enclosing length field is the only terminator.
    pub fn parse_all(buf: &[u8]) -> Result<Vec<Self>, CodecError> {
        let mut prefixes = Vec::new();
        let mut cursor = 0;
        while cursor < buf.len() {
            let (prefix, consumed) = Self::parse(&buf[cursor..])?;
            prefixes.push(prefix);
            cursor += consumed;
        }
        Ok(prefixes)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.length);
        buf.extend_from_slice(&self.octets);
    }

    fn address(&self) -> Ipv4Addr {
        let mut octets = [0u8; 4];
        for (slot, octet) in octets.iter_mut().zip(self.octets.iter()) {
            *slot = *octet;
        }
        Ipv4Addr::from(octets)
    }
}

/// Format as `a.b.c.d/len`, the exact form used for metric labels
impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address(), self.length)
    }
}
