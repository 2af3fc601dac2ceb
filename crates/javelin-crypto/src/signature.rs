//! Forwarded-identity signature checks.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Digest length of HMAC-SHA256.
pub const SIGNATURE_LEN: usize = 32;

/// Verify that `signature` is the HMAC-SHA256 digest of `data` under the
/// shared forwarding secret. The signature must be exactly 32 bytes.
///
/// The digest comparison never short-circuits: a mismatch in the first byte
/// takes as long as a mismatch in the last, so timing reveals nothing about
/// digest contents.
pub fn verify_forwarding_signature(secret: &[u8], data: &[u8], signature: &[u8]) -> bool {
    if signature.len() != SIGNATURE_LEN {
        return false;
    }
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(data);
    let digest = mac.finalize().into_bytes();
    digest.as_slice().ct_eq(signature).into()
}
