//! Public server surface and the host callback trait.

use std::io;
use std::net::{IpAddr, SocketAddr};

use socket2::{Domain, Socket, Type};

use javelin_proto::forwarding::ForwardedIdentity;
use javelin_proto::PacketOut;

use crate::config::ServerConfig;
use crate::driver::uring::UringDriver;
use crate::engine::Engine;
use crate::error::ServerError;

/// Opaque handle for one accepted connection, valid from accept until the
/// connection is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub(crate) usize);

/// Callbacks the embedding application provides. All of them run
/// synchronously on the thread driving [`Server::poll`].
pub trait HostHandler {
    /// Opaque per-player handle. Returned from [`on_login`] and handed back
    /// on every later callback for the same connection.
    ///
    /// [`on_login`]: HostHandler::on_login
    type Player: Copy;

    /// A proxy-signed identity was verified for `conn`. Return the player
    /// handle to accept the login, or `None` to deny it and close the
    /// connection.
    ///
    /// `identity` borrows from the packet buffer; copy out anything that
    /// must outlive the call.
    fn on_login(&mut self, conn: ConnId, identity: &ForwardedIdentity<'_>) -> Option<Self::Player>;

    /// The login was accepted and Login Success queued. Runs strictly after
    /// [`on_login`](HostHandler::on_login) returned a player.
    fn on_join(&mut self, conn: ConnId, player: Self::Player);

    /// The outbound packet for `conn` was flushed in full. Partial writes
    /// never trigger this.
    fn on_write_finish(&mut self, _conn: ConnId, _player: Self::Player) {}

    /// A complete Play-phase packet body. Return `false` to end the
    /// connection; the default treats all Play traffic as unexpected.
    fn on_play_packet(&mut self, _conn: ConnId, _player: Self::Player, _body: &[u8]) -> bool {
        false
    }
}

/// The login front-end. Owns the listening socket, the io_uring instance and
/// every connection; everything runs on the thread that calls
/// [`poll`](Server::poll).
pub struct Server<H: HostHandler> {
    engine: Engine<H, UringDriver>,
}

impl<H: HostHandler> Server<H> {
    /// Create the ring, the listening socket, and bind it. Fails atomically;
    /// no resource outlives an error return.
    pub fn bind(config: ServerConfig, host: H) -> Result<Self, ServerError> {
        let driver = UringDriver::new().map_err(ServerError::classify)?;

        let ip: IpAddr = config.address.parse().map_err(|_| {
            ServerError::Unknown(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid listen address {:?}", config.address),
            ))
        })?;
        let addr = SocketAddr::new(ip, config.port);
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)
            .map_err(ServerError::classify)?;
        socket.bind(&addr.into()).map_err(ServerError::classify)?;

        Ok(Self {
            engine: Engine::new(
                driver,
                socket,
                host,
                config.forwarding_secret.into_bytes(),
                config.login_timeout_secs,
                config.backlog,
            ),
        })
    }

    /// Start listening and queue the first accept.
    pub fn listen(&mut self) -> Result<(), ServerError> {
        self.engine.listen().map_err(ServerError::classify)
    }

    /// Block until at least one completion arrives, then process every ready
    /// completion, running host callbacks inline.
    pub fn poll(&mut self) -> io::Result<()> {
        self.engine.poll(true)
    }

    /// Process ready completions without blocking.
    pub fn try_poll(&mut self) -> io::Result<()> {
        self.engine.poll(false)
    }

    /// Queue `packet` for `conn`. At most one packet may be in flight per
    /// connection; callers must wait for
    /// [`on_write_finish`](HostHandler::on_write_finish) before queueing the
    /// next. Packets for released or already-closing connections are
    /// discarded.
    pub fn write(&mut self, conn: ConnId, packet: PacketOut) {
        self.engine.write(conn, packet);
    }

    /// Ask for `conn` to be torn down. The connection is finalized once its
    /// in-flight operations have drained.
    pub fn release(&mut self, conn: ConnId) {
        self.engine.release(conn);
    }

    pub fn host(&self) -> &H {
        self.engine.host()
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.engine.host_mut()
    }
}
