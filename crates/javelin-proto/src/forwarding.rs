//! Velocity modern-forwarding payload decoding.
//!
//! The Login Plugin Response body is
//! `varint(message_id) || bool(understood) || signature(32) ||
//! varint(protocol_version) || string(address) || uuid(16) || string(name) ||
//! varint(property_count) || property*`. This module decodes everything after
//! the signature; the message id, understood flag and signature check belong
//! to the protocol handler.

use crate::error::ProtoError;
use crate::reader::PacketReader;

/// Length of the HMAC-SHA256 signature preceding the identity data.
pub const SIGNATURE_LEN: usize = 32;

pub const MAX_ADDRESS_LEN: i32 = 15;
pub const MAX_NAME_LEN: i32 = 16;
pub const MAX_PROPERTY_NAME_LEN: i32 = 32;
pub const MAX_PROPERTY_VALUE_LEN: i32 = 1024;
pub const MAX_PROPERTY_SIGNATURE_LEN: i32 = 1024;

/// One profile property, e.g. the player's skin texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardedProperty<'a> {
    pub name: &'a str,
    pub value: &'a str,
    pub signature: Option<&'a str>,
}

/// The identity a proxy vouches for. All string fields borrow from the
/// packet body and are only valid while it is; copy out anything to be
/// retained past the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedIdentity<'a> {
    /// Client IPv4 address in text form.
    pub address: &'a str,
    /// Raw 16-byte UUID.
    pub uuid: [u8; 16],
    pub name: &'a str,
    pub properties: Vec<ForwardedProperty<'a>>,
}

impl<'a> ForwardedIdentity<'a> {
    /// Decode the span following the signature field. The reader must be
    /// positioned immediately after the signature.
    pub fn decode(r: &mut PacketReader<'a>) -> Result<Self, ProtoError> {
        let _protocol_version = r.read_varint()?;
        let address = r.read_str(MAX_ADDRESS_LEN)?;
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(r.read_bytes(16)?);
        let name = r.read_str(MAX_NAME_LEN)?;

        let count = r.read_varint()?;
        if count < 0 {
            return Err(ProtoError::NegativeCount(count));
        }
        let mut properties = Vec::new();
        for _ in 0..count {
            let name = r.read_str(MAX_PROPERTY_NAME_LEN)?;
            let value = r.read_str(MAX_PROPERTY_VALUE_LEN)?;
            let signature = if r.read_bool()? {
                Some(r.read_str(MAX_PROPERTY_SIGNATURE_LEN)?)
            } else {
                None
            };
            properties.push(ForwardedProperty {
                name,
                value,
                signature,
            });
        }

        Ok(Self {
            address,
            uuid,
            name,
            properties,
        })
    }
}
