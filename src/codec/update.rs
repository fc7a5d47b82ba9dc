use std::collections::HashMap;

use byteorder::{ByteOrder, NetworkEndian};

use super::prefix::Prefix;
use super::CodecError;

pub const ATTR_AS_PATH: u8 = 2;

/// Flags bit 4: length field is two bytes instead of one
const FLAG_EXTENDED_LENGTH: u8 = 0x10;

/// One path attribute record. Values are kept raw; AS_PATH is the only
/// type this speaker interprets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathAttribute {
    pub flags: u8,
    pub kind: u8,
    pub value: Vec<u8>,
}

impl PathAttribute {
    /// Parse attribute records until the end of the buffer. Records are
    /// keyed by type; a duplicate type overwrites the earlier record.
    pub fn parse_all(buf: &[u8]) -> Result<HashMap<u8, Self>, CodecError> {
        let mut attributes = HashMap::new();
        let mut cursor = 0;
        while cursor < buf.len() {
            if buf.len() < cursor + 3 {
                return Err(CodecError::Truncated("path attribute header"));
            }
            let flags = buf[cursor];
            let kind = buf[cursor + 1];
            let (header, length) = if flags & FLAG_EXTENDED_LENGTH != 0 {
                if buf.len() < cursor + 4 {
                    return Err(CodecError::Truncated("path attribute extended length"));
                }
                (4, usize::from(NetworkEndian::read_u16(&buf[cursor + 2..cursor + 4])))
            } else {
                (3, usize::from(buf[cursor + 2]))
            };
            if buf.len() < cursor + header + length {
                return Err(CodecError::Truncated("path attribute value"));
            }
            let value = buf[cursor + header..cursor + header + length].to_vec();
            attributes.insert(kind, PathAttribute { flags, kind, value });
            cursor += header + length;
        }
        Ok(attributes)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.flags);
        buf.push(self.kind);
        if self.flags & FLAG_EXTENDED_LENGTH != 0 {
            buf.extend_from_slice(&(self.value.len() as u16).to_be_bytes());
        } else {
            buf.push(self.value.len() as u8);
        }
        buf.extend_from_slice(&self.value);
    }
}

/// Decode an AS_PATH attribute value: segment type, ASN count, then
/// that many ASNs. Field width is 2 bytes unless the session negotiated
/// four-byte ASNs, fixed at OPEN time.
///
/// An empty value yields an empty path; the session logs it as a
/// decode warning rather than dropping the UPDATE.
pub fn parse_as_path(value: &[u8], four_byte_asn: bool) -> Result<Vec<u32>, CodecError> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    if value.len() < 2 {
        return Err(CodecError::Truncated("AS_PATH segment header"));
    }
    let count = usize::from(value[1]);
    let width = if four_byte_asn { 4 } else { 2 };
    if value.len() < 2 + count * width {
        return Err(CodecError::Truncated("AS_PATH segment"));
    }
    let path = value[2..2 + count * width]
        .chunks(width)
        .map(|chunk| {
            if four_byte_asn {
                NetworkEndian::read_u32(chunk)
            } else {
                u32::from(NetworkEndian::read_u16(chunk))
            }
        })
        .collect();
    Ok(path)
}

/// BGP UPDATE body: withdrawn routes, path attributes, and the NLRI
/// that fills the rest of the message
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateMessage {
    pub withdrawn_routes: Vec<Prefix>,
    pub attributes: HashMap<u8, PathAttribute>,
    pub nlri: Vec<Prefix>,
    /// ASNs from the AS_PATH attribute, already width-decoded
    pub as_path: Vec<u32>,
}

impl UpdateMessage {
    pub fn parse(buf: &[u8], four_byte_asn: bool) -> Result<Self, CodecError> {
        if buf.len() < 2 {
            return Err(CodecError::Truncated("withdrawn routes length"));
        }
        let withdrawn_len = usize::from(NetworkEndian::read_u16(&buf[0..2]));
        if buf.len() < 2 + withdrawn_len {
            return Err(CodecError::Truncated("withdrawn routes"));
        }
        let withdrawn_routes = Prefix::parse_all(&buf[2..2 + withdrawn_len])?;
        let mut cursor = 2 + withdrawn_len;

        if buf.len() < cursor + 2 {
            return Err(CodecError::Truncated("path attributes length"));
        }
        let attr_len = usize::from(NetworkEndian::read_u16(&buf[cursor..cursor + 2]));
        cursor += 2;
        if buf.len() < cursor + attr_len {
            return Err(CodecError::Truncated("path attributes"));
        }
        let attributes = PathAttribute::parse_all(&buf[cursor..cursor + attr_len])?;
        cursor += attr_len;

        let nlri = Prefix::parse_all(&buf[cursor..])?;

        let as_path = match attributes.get(&ATTR_AS_PATH) {
            Some(attribute) => parse_as_path(&attribute.value, four_byte_asn)?,
            None => Vec::new(),
        };
        Ok(Self {
            withdrawn_routes,
            attributes,
            nlri,
            as_path,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut withdrawn = Vec::new();
        for prefix in &self.withdrawn_routes {
            prefix.encode(&mut withdrawn);
        }
        buf.extend_from_slice(&(withdrawn.len() as u16).to_be_bytes());
        buf.extend_from_slice(&withdrawn);

        let mut attrs = Vec::new();
        for attribute in self.attributes.values() {
            attribute.encode(&mut attrs);
        }
        buf.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
        buf.extend_from_slice(&attrs);

        for prefix in &self.nlri {
            prefix.encode(buf);
        }
    }

    /// True when an AS_PATH attribute is present but carries no bytes
    pub fn has_empty_as_path(&self) -> bool {
        self.attributes
            .get(&ATTR_AS_PATH)
            .map(|a| a.value.is_empty())
            .unwrap_or(false)
    }
}
