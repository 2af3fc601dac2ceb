//! Wire primitives for the Minecraft Java Edition login sequence.
//!
//! Every packet on the wire is `varint(body_length) || body`, where the body
//! starts with a varint packet id. This crate provides the borrowing reader
//! used to decode fully-buffered bodies, the exact-size outbound packet
//! builder, the login/play packet serializers, and the decoder for the
//! identity payload a Velocity proxy forwards during modern forwarding.

pub mod error;
pub mod forwarding;
pub mod packets;
pub mod play;
pub mod reader;
pub mod writer;

pub use error::ProtoError;
pub use reader::PacketReader;
pub use writer::{str_len, varint_len, PacketOut};
