//! Outbound packet construction.
//!
//! Every builder computes its exact encoded size ahead of allocation so a
//! packet is a single correctly-sized buffer: the varint length header is
//! written first and the body appended with no growth while writing.

use crate::error::ProtoError;

/// Length headers are capped at 3 bytes, i.e. packet bodies must be shorter
/// than 2097152 bytes.
pub const MAX_HEADER_LEN: usize = 3;

/// Encoded size of a varint in bytes.
pub fn varint_len(value: i32) -> usize {
    let mut v = value as u32;
    let mut n = 1;
    while v >= 0x80 {
        v >>= 7;
        n += 1;
    }
    n
}

/// Encoded size of a length-prefixed string in bytes.
pub fn str_len(s: &str) -> usize {
    varint_len(s.len() as i32) + s.len()
}

/// A length-prefixed outbound packet. `written` tracks partial completion
/// across multiple underlying write operations.
pub struct PacketOut {
    buf: Vec<u8>,
    written: usize,
}

impl PacketOut {
    /// Allocate a packet for a body of exactly `body_len` bytes and write
    /// the length header. The caller must then append exactly `body_len`
    /// bytes through the `put_*` methods.
    pub fn with_body_len(body_len: usize) -> Result<Self, ProtoError> {
        let header_len = varint_len(body_len as i32);
        if header_len > MAX_HEADER_LEN {
            return Err(ProtoError::BodyTooLarge(body_len));
        }
        let total = header_len + body_len;
        let mut buf = Vec::new();
        buf.try_reserve_exact(total)
            .map_err(|_| ProtoError::AllocationFailed(total))?;
        let mut pkt = Self { buf, written: 0 };
        pkt.put_varint(body_len as i32);
        Ok(pkt)
    }

    pub fn put_varint(&mut self, value: i32) {
        let mut v = value as u32;
        loop {
            if v & !0x7F == 0 {
                self.buf.push(v as u8);
                return;
            }
            self.buf.push((v & 0x7F | 0x80) as u8);
            v >>= 7;
        }
    }

    pub fn put_str(&mut self, s: &str) {
        self.put_varint(s.len() as i32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// The full wire form, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// The bytes not yet handed to the kernel.
    pub fn unwritten(&self) -> &[u8] {
        &self.buf[self.written..]
    }

    /// Record that `n` more bytes were written to the socket.
    pub fn advance(&mut self, n: usize) {
        self.written += n;
        debug_assert!(self.written <= self.buf.len());
    }

    pub fn is_flushed(&self) -> bool {
        self.written == self.buf.len()
    }
}
