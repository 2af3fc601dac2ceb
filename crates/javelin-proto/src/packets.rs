//! Login-sequence packet ids and clientbound builders.

use crate::error::ProtoError;
use crate::writer::{str_len, varint_len, PacketOut};

// Serverbound ids.
pub const HANDSHAKE: i32 = 0x00;
pub const LOGIN_START: i32 = 0x00;
pub const LOGIN_PLUGIN_RESPONSE: i32 = 0x02;

// Clientbound ids.
pub const LOGIN_SUCCESS: i32 = 0x02;
pub const LOGIN_PLUGIN_REQUEST: i32 = 0x04;

/// Handshake "next state" value that selects the login sequence.
pub const NEXT_STATE_LOGIN: i32 = 2;

/// Plugin channel a Velocity proxy answers identity data on.
pub const FORWARDING_CHANNEL: &str = "velocity:player_info";

/// Build a Login Plugin Request on the forwarding channel, carrying the
/// correlation token the response must echo.
pub fn login_plugin_request(message_id: i32) -> Result<PacketOut, ProtoError> {
    let body = varint_len(LOGIN_PLUGIN_REQUEST)
        + varint_len(message_id)
        + str_len(FORWARDING_CHANNEL);
    let mut pkt = PacketOut::with_body_len(body)?;
    pkt.put_varint(LOGIN_PLUGIN_REQUEST);
    pkt.put_varint(message_id);
    pkt.put_str(FORWARDING_CHANNEL);
    Ok(pkt)
}

/// Build a Login Success echoing the forwarded UUID and name, with an empty
/// property list.
pub fn login_success(uuid: &[u8; 16], name: &str) -> Result<PacketOut, ProtoError> {
    let body = varint_len(LOGIN_SUCCESS) + 16 + str_len(name) + varint_len(0);
    let mut pkt = PacketOut::with_body_len(body)?;
    pkt.put_varint(LOGIN_SUCCESS);
    pkt.put_bytes(uuid);
    pkt.put_str(name);
    pkt.put_varint(0);
    Ok(pkt)
}
