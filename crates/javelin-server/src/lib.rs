//! Embeddable login front-end for Minecraft Java Edition backends running
//! behind a Velocity proxy with modern forwarding.
//!
//! A single-threaded io_uring reactor accepts connections, frames
//! length-prefixed packets off the wire, walks the login sequence
//! (Handshake → Login Start → Plugin Response → Login Success → Play) and
//! verifies the HMAC-SHA256 signature the proxy puts over the forwarded
//! player identity. The host application supplies a [`HostHandler`] and is
//! called back synchronously from [`Server::poll`] once a player is
//! accepted.
//!
//! Linux only: the one implemented I/O backend is io_uring. The
//! [`driver::IoDriver`] trait is the seam for adding others.

pub mod config;
pub mod driver;
pub mod error;
pub mod server;

mod connection;
mod engine;
mod handler;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{ConnId, HostHandler, Server};

// Re-exported so hosts don't need a direct javelin-proto dependency for the
// callback and write signatures.
pub use javelin_proto::forwarding::{ForwardedIdentity, ForwardedProperty};
pub use javelin_proto::PacketOut;
