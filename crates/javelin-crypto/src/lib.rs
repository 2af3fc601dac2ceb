//! Cryptography for modern forwarding: HMAC-SHA256 signature verification.

pub mod signature;

pub use signature::{verify_forwarding_signature, SIGNATURE_LEN};
