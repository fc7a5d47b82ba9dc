use super::CodecError;

/// A type-length-value record: 1-byte type, 1-byte length, `length`
/// bytes of value. Used for OPEN optional parameters, whose capability
/// option is itself a nested TLV sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tlv {
    pub kind: u8,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn new(kind: u8, value: Vec<u8>) -> Self {
        Self { kind, value }
    }

    /// Parse TLV records until the end of the buffer (the sequence has
    /// no record count of its own)
    pub fn parse_all(buf: &[u8]) -> Result<Vec<Self>, CodecError> {
        let mut records = Vec::new();
        let mut cursor = 0;
        while cursor < buf.len() {
            if buf.len() < cursor + 2 {
                return Err(CodecError::Truncated("TLV header"));
            }
            let kind = buf[cursor];
            let length = usize::from(buf[cursor + 1]);
            if buf.len() < cursor + 2 + length {
                return Err(CodecError::Truncated("TLV value"));
            }
            records.push(Self::new(kind, buf[cursor + 2..cursor + 2 + length].to_vec()));
            cursor += 2 + length;
        }
        Ok(records)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.kind);
        buf.push(self.value.len() as u8);
        buf.extend_from_slice(&self.value);
    }
}
