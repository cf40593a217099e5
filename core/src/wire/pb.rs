//! Reader for the game's protocol-buffer-style tag/value encoding.
//!
//! Leniency is a hard requirement at this layer: server builds change
//! without notice and the observer must keep running. Malformed tags are
//! reported as end-of-stream (field number 0) and `safe_skip_last_field`
//! drains the buffer rather than erroring, so callers can always fall
//! through to "partial message, best-effort fields".

use super::reader::{ByteReader, WireError, WireResult};

/// Protobuf wire types. Groups are obsolete but still skippable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    StartGroup,
    EndGroup,
    Fixed32,
    /// Reserved encodings 6 and 7.
    Invalid,
}

impl WireType {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => Self::Varint,
            1 => Self::Fixed64,
            2 => Self::LengthDelimited,
            3 => Self::StartGroup,
            4 => Self::EndGroup,
            5 => Self::Fixed32,
            _ => Self::Invalid,
        }
    }
}

/// Tag/value reader over a message payload.
#[derive(Debug)]
pub struct PbReader<'a> {
    inner: ByteReader<'a>,
    last_wire_type: WireType,
}

impl<'a> PbReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: ByteReader::new(data),
            last_wire_type: WireType::Invalid,
        }
    }

    pub fn remaining(&self) -> usize {
        self.inner.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// LEB128 varint, at most 10 bytes.
    pub fn read_varint(&mut self) -> WireResult<u64> {
        let mut value: u64 = 0;
        for i in 0..10 {
            let byte = self.inner.read_u8()?;
            value |= u64::from(byte & 0x7f) << (i * 7);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::VarintOverflow)
    }

    /// Read the next field tag as `(field_number, wire_type)`.
    ///
    /// Field number 0 means "stop": either the payload is exhausted or
    /// the tag bytes are malformed. Callers must not treat it as a real
    /// field.
    pub fn read_tag(&mut self) -> (u32, WireType) {
        if self.inner.is_empty() {
            return (0, WireType::Invalid);
        }
        match self.read_varint() {
            Ok(key) => {
                let field = (key >> 3) as u32;
                let wire_type = WireType::from_bits(key & 0x7);
                self.last_wire_type = wire_type;
                if field == 0 || wire_type == WireType::Invalid {
                    // Corrupt tag; make sure the caller's loop terminates.
                    self.inner.read_remaining();
                    return (0, wire_type);
                }
                (field, wire_type)
            }
            Err(_) => {
                self.inner.read_remaining();
                (0, WireType::Invalid)
            }
        }
    }

    /// Fixed 32-bit little-endian value.
    pub fn read_fixed32(&mut self) -> WireResult<u32> {
        let b = self.inner.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Fixed 64-bit little-endian value.
    pub fn read_fixed64(&mut self) -> WireResult<u64> {
        let b = self.inner.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Length-delimited payload (bytes, strings, nested messages).
    pub fn read_len_delimited(&mut self) -> WireResult<&'a [u8]> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| WireError::VarintOverflow)?;
        self.inner.read_bytes(len)
    }

    /// Skip the value belonging to the most recently read tag.
    ///
    /// Never fails: if the value is truncated or the wire type is
    /// unknown, the rest of the buffer is consumed so the field loop
    /// terminates cleanly.
    pub fn safe_skip_last_field(&mut self) {
        let drained = match self.last_wire_type {
            WireType::Varint => self.read_varint().is_err(),
            WireType::Fixed64 => self.inner.skip(8).is_err(),
            WireType::Fixed32 => self.inner.skip(4).is_err(),
            WireType::LengthDelimited => self.read_len_delimited().is_err(),
            // Group wire types carry no length; nothing sane to skip.
            WireType::StartGroup | WireType::EndGroup | WireType::Invalid => true,
        };
        if drained {
            self.inner.read_remaining();
        }
    }
}

/// Encode a varint (test support and synthetic-frame construction).
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Encode a field tag.
pub fn encode_tag(field: u32, wire_type: u64, out: &mut Vec<u8>) {
    encode_varint((u64::from(field) << 3) | wire_type, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(value, &mut buf);
            let mut r = PbReader::new(&buf);
            assert_eq!(r.read_varint().unwrap(), value);
        }
    }

    #[test]
    fn tag_decodes_field_and_wire_type() {
        let mut buf = Vec::new();
        encode_tag(7, 2, &mut buf);
        encode_varint(0, &mut buf); // empty payload
        let mut r = PbReader::new(&buf);
        assert_eq!(r.read_tag(), (7, WireType::LengthDelimited));
        assert_eq!(r.read_len_delimited().unwrap(), &[] as &[u8]);
        assert_eq!(r.read_tag().0, 0);
    }

    #[test]
    fn malformed_tag_reads_as_end_of_stream() {
        // A lone continuation byte can never complete a varint.
        let mut r = PbReader::new(&[0x80]);
        assert_eq!(r.read_tag().0, 0);
        assert!(r.is_empty());

        // Field number 0 is not a legal tag.
        let mut r = PbReader::new(&[0x00, 0x01, 0x02]);
        assert_eq!(r.read_tag().0, 0);
        assert!(r.is_empty());
    }

    #[test]
    fn safe_skip_survives_truncated_values() {
        // Tag says "8-byte fixed64" but only 2 bytes follow.
        let mut buf = Vec::new();
        encode_tag(3, 1, &mut buf);
        buf.extend_from_slice(&[0xaa, 0xbb]);
        let mut r = PbReader::new(&buf);
        assert_eq!(r.read_tag(), (3, WireType::Fixed64));
        r.safe_skip_last_field();
        assert!(r.is_empty());
        assert_eq!(r.read_tag().0, 0);
    }

    #[test]
    fn safe_skip_handles_every_wire_type() {
        let mut buf = Vec::new();
        encode_tag(1, 0, &mut buf);
        encode_varint(42, &mut buf);
        encode_tag(2, 5, &mut buf);
        buf.extend_from_slice(&[1, 2, 3, 4]);
        encode_tag(3, 2, &mut buf);
        encode_varint(2, &mut buf);
        buf.extend_from_slice(&[9, 9]);
        encode_tag(4, 0, &mut buf);
        encode_varint(7, &mut buf);

        let mut r = PbReader::new(&buf);
        let mut fields = Vec::new();
        loop {
            let (field, _) = r.read_tag();
            if field == 0 {
                break;
            }
            fields.push(field);
            r.safe_skip_last_field();
        }
        assert_eq!(fields, vec![1, 2, 3, 4]);
    }
}
