//! Per-socket connection state.

use std::os::fd::RawFd;

use javelin_proto::PacketOut;

/// The header buffer is sized for the widest allowed length header.
pub(crate) const HEADER_BUF_LEN: usize = 2;

/// Protocol phase; drives which handler runs on the next complete packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Handshake,
    LoginStart,
    AwaitingPluginResponse,
    /// Login Success queued; no further client packets are legal until the
    /// reply has flushed and the connection moves to Play.
    LoginSuccessPending,
    Play,
}

/// Packet framing state, orthogonal to [`Phase`]. Each variant carries only
/// the fields that state uses.
pub(crate) enum Framing {
    /// Accumulating the varint body-length header.
    ReadingHeader {
        header_buf: [u8; HEADER_BUF_LEN],
        header_len: usize,
        body_len: usize,
    },
    /// Accumulating body bytes up to the declared length.
    ReadingBody { buf: Vec<u8>, received: usize },
}

impl Framing {
    pub(crate) fn new_header() -> Self {
        Framing::ReadingHeader {
            header_buf: [0; HEADER_BUF_LEN],
            header_len: 0,
            body_len: 0,
        }
    }
}

/// One accepted socket. Boxed inside the engine's slab so buffer addresses
/// stay stable while the kernel holds them.
pub(crate) struct Connection<P> {
    pub(crate) fd: RawFd,
    pub(crate) phase: Phase,
    pub(crate) framing: Framing,
    /// Maximum bytes allowed in the length header for the current phase: 1
    /// until a plugin response is expected, 2 once it is.
    pub(crate) header_len_limit: usize,
    /// At most one outbound packet; a second write before this one flushes
    /// is a caller contract violation.
    pub(crate) pending_out: Option<PacketOut>,
    /// In-flight operations still referencing this slot. The slot may be
    /// reclaimed only once this reaches zero.
    pub(crate) pending_ops: u32,
    pub(crate) closing: bool,
    /// Set once no cancellable login timer remains (cancelled or fired).
    pub(crate) timeout_cancelled: bool,
    /// Correlation token bound to the outstanding plugin request.
    pub(crate) challenge: i32,
    /// Host handle returned by `on_login`.
    pub(crate) player: Option<P>,
}

impl<P> Connection<P> {
    pub(crate) fn new(fd: RawFd) -> Self {
        Self {
            fd,
            phase: Phase::Handshake,
            framing: Framing::new_header(),
            header_len_limit: 1,
            pending_out: None,
            pending_ops: 0,
            closing: false,
            timeout_cancelled: false,
            challenge: 0,
            player: None,
        }
    }
}
