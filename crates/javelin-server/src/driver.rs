//! Asynchronous I/O capability interface.
//!
//! The engine speaks to the kernel exclusively through [`IoDriver`]:
//! submissions go in, [`Completion`]s come out. One backend (io_uring) is
//! implemented; the trait is the seam for others, and for the deterministic
//! fake the engine tests run against.

pub mod uring;

use std::io;
use std::os::fd::RawFd;

/// Index of the connection slot an operation references.
pub type ConnToken = usize;

/// Kind of a submitted operation, echoed back on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Accept,
    Read,
    Write,
    Timeout,
    TimeoutCancel,
}

/// A completed operation. `result` follows kernel conventions: a byte count
/// or new descriptor when non-negative, a negated errno when negative.
#[derive(Debug, Clone, Copy)]
pub struct Completion {
    pub kind: OpKind,
    pub token: ConnToken,
    pub result: i32,
}

pub trait IoDriver {
    /// Queue an accept on the listening socket. Accepts carry no connection
    /// token.
    fn submit_accept(&mut self, listener: RawFd) -> io::Result<()>;

    /// Queue a read of up to `len` bytes into `buf`.
    ///
    /// # Safety
    ///
    /// `buf..buf+len` must stay valid and unaliased until the matching
    /// `(Read, token)` completion is delivered.
    unsafe fn submit_read(
        &mut self,
        token: ConnToken,
        fd: RawFd,
        buf: *mut u8,
        len: u32,
    ) -> io::Result<()>;

    /// Queue a write of `len` bytes from `buf`.
    ///
    /// # Safety
    ///
    /// `buf..buf+len` must stay valid until the matching `(Write, token)`
    /// completion is delivered.
    unsafe fn submit_write(
        &mut self,
        token: ConnToken,
        fd: RawFd,
        buf: *const u8,
        len: u32,
    ) -> io::Result<()>;

    /// Arm a one-shot timeout. At most one may be outstanding per token.
    fn submit_timeout(&mut self, token: ConnToken, secs: u32) -> io::Result<()>;

    /// Cancel the outstanding timeout for `token`. Both the cancellation and
    /// the timeout itself complete: the timeout reports `-ECANCELED` if the
    /// cancel won the race, a genuine fire otherwise.
    fn submit_timeout_cancel(&mut self, token: ConnToken) -> io::Result<()>;

    /// Half-close both directions of a socket, failing in-flight operations
    /// on it. Synchronous; produces no completion.
    fn shutdown(&mut self, fd: RawFd);

    /// Flush pending submissions and drain every ready completion into
    /// `out`. When `wait` is set, block until at least one is available —
    /// the only blocking point in the system.
    fn drain_completions(&mut self, out: &mut Vec<Completion>, wait: bool) -> io::Result<()>;
}
