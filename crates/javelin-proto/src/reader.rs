//! Borrowing cursor over a fully-buffered packet body.

use crate::error::ProtoError;

/// Maximum bytes the varint decoder will consume. A 32-bit value needs five;
/// the sixth is slop so over-long-but-terminated encodings are still caught
/// as errors rather than silently truncated.
pub const MAX_VARINT_BYTES: usize = 6;

/// Reads protocol fields out of a packet body. All string and byte-span
/// results borrow from the underlying buffer and are valid only as long as
/// it is.
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// The not-yet-consumed tail of the buffer. Used to obtain the span an
    /// identity signature covers.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take_byte(&mut self) -> Result<u8, ProtoError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or(ProtoError::BufferTooShort {
                needed: 1,
                remaining: 0,
            })?;
        self.pos += 1;
        Ok(b)
    }

    /// Decode a varint: little-endian base-128, 7 data bits plus a
    /// continuation bit per byte.
    pub fn read_varint(&mut self) -> Result<i32, ProtoError> {
        let mut result: u64 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.take_byte()?;
            result |= ((byte & 0x7F) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result as i32);
            }
        }
        Err(ProtoError::VarIntTooLong {
            max_bytes: MAX_VARINT_BYTES,
        })
    }

    /// Big-endian unsigned 16-bit.
    pub fn read_u16(&mut self) -> Result<u16, ProtoError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Single 0/1 byte. Anything else is malformed.
    pub fn read_bool(&mut self) -> Result<bool, ProtoError> {
        match self.take_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(ProtoError::InvalidBool(b)),
        }
    }

    /// A raw span of exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtoError> {
        let remaining = self.buf.len() - self.pos;
        if len > remaining {
            return Err(ProtoError::BufferTooShort {
                needed: len,
                remaining,
            });
        }
        let span = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(span)
    }

    /// A length-prefixed UTF-8 string of at most `max_len` bytes, returned
    /// as a borrowed view.
    pub fn read_str(&mut self, max_len: i32) -> Result<&'a str, ProtoError> {
        let len = self.read_varint()?;
        if len < 0 || len > max_len {
            return Err(ProtoError::LengthOutOfRange { len, max: max_len });
        }
        let bytes = self.read_bytes(len as usize)?;
        std::str::from_utf8(bytes).map_err(|_| ProtoError::InvalidUtf8)
    }

    /// Skip over a length-prefixed string whose content is irrelevant. The
    /// length bound is still enforced.
    pub fn skip_str(&mut self, max_len: i32) -> Result<(), ProtoError> {
        let len = self.read_varint()?;
        if len < 0 || len > max_len {
            return Err(ProtoError::LengthOutOfRange { len, max: max_len });
        }
        self.read_bytes(len as usize)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::PacketOut;

    fn body_of(pkt: &PacketOut) -> &[u8] {
        let full = pkt.as_bytes();
        // Strip the one-byte length header (all test packets are short).
        &full[1..]
    }

    #[test]
    fn varint_roundtrip_minimal_sizes() {
        for (value, expected_len) in [
            (0, 1),
            (1, 1),
            (127, 1),
            (128, 2),
            (300, 2),
            (16383, 2),
            (16384, 3),
            (2097151, 3),
            (2097152, 4),
            (i32::MAX, 5),
            (-1, 5),
            (i32::MIN, 5),
        ] {
            let mut pkt = PacketOut::with_body_len(crate::varint_len(value)).unwrap();
            pkt.put_varint(value);
            let body = body_of(&pkt);
            assert_eq!(body.len(), expected_len, "size of {value}");
            let mut r = PacketReader::new(body);
            assert_eq!(r.read_varint().unwrap(), value);
            assert!(r.remaining().is_empty());
        }
    }

    #[test]
    fn varint_too_long() {
        let mut r = PacketReader::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert_eq!(
            r.read_varint(),
            Err(ProtoError::VarIntTooLong { max_bytes: 6 })
        );
    }

    #[test]
    fn varint_truncated() {
        let mut r = PacketReader::new(&[0x80]);
        assert!(matches!(
            r.read_varint(),
            Err(ProtoError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn str_bounds() {
        // "abc" with max 2 is rejected before the bytes are consumed.
        let wire = [0x03, b'a', b'b', b'c'];
        let mut r = PacketReader::new(&wire);
        assert_eq!(
            r.read_str(2),
            Err(ProtoError::LengthOutOfRange { len: 3, max: 2 })
        );

        let mut r = PacketReader::new(&wire);
        assert_eq!(r.read_str(16).unwrap(), "abc");
    }

    #[test]
    fn str_overruns_buffer() {
        let mut r = PacketReader::new(&[0x05, b'a', b'b']);
        assert!(matches!(
            r.read_str(16),
            Err(ProtoError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn str_invalid_utf8() {
        let mut r = PacketReader::new(&[0x02, 0xFF, 0xFE]);
        assert_eq!(r.read_str(16), Err(ProtoError::InvalidUtf8));
    }

    #[test]
    fn skip_str_enforces_bound() {
        let mut r = PacketReader::new(&[0x03, 1, 2, 3]);
        assert!(r.skip_str(2).is_err());
        let mut r = PacketReader::new(&[0x03, 1, 2, 3]);
        assert!(r.skip_str(3).is_ok());
    }

    #[test]
    fn u16_big_endian() {
        let mut r = PacketReader::new(&[0x63, 0xDE]);
        assert_eq!(r.read_u16().unwrap(), 25566);
    }

    #[test]
    fn bool_strict() {
        assert_eq!(PacketReader::new(&[0]).read_bool(), Ok(false));
        assert_eq!(PacketReader::new(&[1]).read_bool(), Ok(true));
        assert_eq!(
            PacketReader::new(&[2]).read_bool(),
            Err(ProtoError::InvalidBool(2))
        );
    }

    #[test]
    fn remaining_tracks_cursor() {
        let wire = [0x01, 0xAA, 0xBB];
        let mut r = PacketReader::new(&wire);
        r.read_varint().unwrap();
        assert_eq!(r.remaining(), &[0xAA, 0xBB]);
    }
}
