//! Protocol-level errors.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("buffer too short: need {needed} bytes, have {remaining}")]
    BufferTooShort { needed: usize, remaining: usize },

    #[error("varint is too long (more than {max_bytes} bytes)")]
    VarIntTooLong { max_bytes: usize },

    #[error("string length {len} outside 0..={max}")]
    LengthOutOfRange { len: i32, max: i32 },

    #[error("negative element count: {0}")]
    NegativeCount(i32),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("invalid boolean byte 0x{0:02X}")]
    InvalidBool(u8),

    #[error("packet body too large: {0} bytes")]
    BodyTooLarge(usize),

    #[error("packet buffer allocation failed ({0} bytes)")]
    AllocationFailed(usize),
}
