//! Play-phase packet builders.
//!
//! One-shot serializers with no state-machine involvement; hosts call these
//! after `on_join` and queue the result with the server's write operation.

use crate::error::ProtoError;
use crate::writer::{str_len, varint_len, PacketOut};

pub const JOIN_GAME: i32 = 0x23;

/// The Join Game packet sent to move a freshly logged-in client into the
/// world. `registry_codec` is an already-encoded NBT span passed through
/// verbatim.
pub struct JoinGame<'a> {
    pub entity_id: i32,
    pub hardcore: bool,
    pub gamemode: u8,
    pub prev_gamemode: i8,
    pub dimension_names: &'a [&'a str],
    pub registry_codec: &'a [u8],
    pub dimension_type: &'a str,
    pub dimension_name: &'a str,
    pub seed_hash: i64,
    pub max_players: i32,
    pub view_distance: i32,
    pub sim_distance: i32,
    pub reduced_debug_info: bool,
    pub show_respawn_screen: bool,
    pub debug_world: bool,
    pub flat_world: bool,
    /// Dimension name and packed position of the last death, if any.
    pub death_location: Option<(&'a str, i64)>,
}

impl JoinGame<'_> {
    pub fn encode(&self) -> Result<PacketOut, ProtoError> {
        let dim_names_len: usize = self.dimension_names.iter().map(|n| str_len(n)).sum();

        let mut body = varint_len(JOIN_GAME)
            + 4 // entity id
            + 1 // hardcore
            + 1 // gamemode
            + 1 // previous gamemode
            + varint_len(self.dimension_names.len() as i32)
            + dim_names_len
            + self.registry_codec.len()
            + str_len(self.dimension_type)
            + str_len(self.dimension_name)
            + 8 // seed hash
            + varint_len(self.max_players)
            + varint_len(self.view_distance)
            + varint_len(self.sim_distance)
            + 1 // reduced debug info
            + 1 // show respawn screen
            + 1 // debug world
            + 1 // flat world
            + 1; // has death location
        if let Some((dim, _)) = self.death_location {
            body += str_len(dim) + 8;
        }

        let mut pkt = PacketOut::with_body_len(body)?;
        pkt.put_varint(JOIN_GAME);
        pkt.put_i32(self.entity_id);
        pkt.put_bool(self.hardcore);
        pkt.put_u8(self.gamemode);
        pkt.put_u8(self.prev_gamemode as u8);
        pkt.put_varint(self.dimension_names.len() as i32);
        for name in self.dimension_names {
            pkt.put_str(name);
        }
        pkt.put_bytes(self.registry_codec);
        pkt.put_str(self.dimension_type);
        pkt.put_str(self.dimension_name);
        pkt.put_i64(self.seed_hash);
        pkt.put_varint(self.max_players);
        pkt.put_varint(self.view_distance);
        pkt.put_varint(self.sim_distance);
        pkt.put_bool(self.reduced_debug_info);
        pkt.put_bool(self.show_respawn_screen);
        pkt.put_bool(self.debug_world);
        pkt.put_bool(self.flat_world);
        pkt.put_bool(self.death_location.is_some());
        if let Some((dim, pos)) = self.death_location {
            pkt.put_str(dim);
            pkt.put_i64(pos);
        }
        Ok(pkt)
    }
}
