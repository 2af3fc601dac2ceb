//! Completion-driven reactor.
//!
//! One outstanding accept, one read per connection, at most one write per
//! connection, one login timeout per connection. Every completion decrements
//! the connection's in-flight count; teardown marks the connection closing,
//! shuts the socket down to fail the remaining operations, and the slot is
//! reclaimed in a single place once the count drains to zero.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use slab::Slab;
use socket2::Socket;
use tracing::{debug, error, warn};

use javelin_proto::PacketOut;

use crate::connection::{Connection, Framing, Phase, HEADER_BUF_LEN};
use crate::driver::{Completion, ConnToken, IoDriver, OpKind};
use crate::handler;
use crate::server::{ConnId, HostHandler};

/// What a read completion led to.
enum Next {
    ArmRead,
    Handle(Vec<u8>),
    Violation(&'static str),
}

pub(crate) struct Engine<H: HostHandler, D: IoDriver> {
    driver: D,
    listener: Socket,
    listener_fd: RawFd,
    conns: Slab<Box<Connection<H::Player>>>,
    host: H,
    secret: Vec<u8>,
    login_timeout_secs: u32,
    backlog: i32,
    /// Scratch reused across polls.
    completions: Vec<Completion>,
}

impl<H: HostHandler, D: IoDriver> Engine<H, D> {
    pub(crate) fn new(
        driver: D,
        listener: Socket,
        host: H,
        secret: Vec<u8>,
        login_timeout_secs: u32,
        backlog: i32,
    ) -> Self {
        let listener_fd = listener.as_raw_fd();
        Self {
            driver,
            listener,
            listener_fd,
            conns: Slab::new(),
            host,
            secret,
            login_timeout_secs,
            backlog,
            completions: Vec::new(),
        }
    }

    pub(crate) fn listen(&mut self) -> io::Result<()> {
        self.listener.listen(self.backlog)?;
        self.driver.submit_accept(self.listener_fd)
    }

    pub(crate) fn poll(&mut self, wait: bool) -> io::Result<()> {
        let mut completions = mem::take(&mut self.completions);
        completions.clear();
        self.driver.drain_completions(&mut completions, wait)?;
        for completion in &completions {
            self.dispatch(*completion);
        }
        self.completions = completions;
        Ok(())
    }

    pub(crate) fn write(&mut self, conn: ConnId, packet: PacketOut) {
        self.queue_write(conn.0, packet);
    }

    pub(crate) fn release(&mut self, conn: ConnId) {
        self.begin_shutdown(conn.0);
    }

    pub(crate) fn host(&self) -> &H {
        &self.host
    }

    pub(crate) fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    fn dispatch(&mut self, completion: Completion) {
        let Completion {
            kind,
            token,
            result,
        } = completion;
        match kind {
            OpKind::Accept => self.on_accept(result),
            OpKind::Read => self.on_read(token, result),
            OpKind::Write => self.on_write(token, result),
            OpKind::Timeout => self.on_timeout(token, result),
            OpKind::TimeoutCancel => self.on_timeout_cancel(token),
        }
    }

    fn on_accept(&mut self, result: i32) {
        if result >= 0 {
            let fd = result as RawFd;
            let token = self.conns.insert(Box::new(Connection::new(fd)));
            debug!(token, fd, "connection accepted");
            match self.driver.submit_timeout(token, self.login_timeout_secs) {
                Ok(()) => self.conns[token].pending_ops += 1,
                Err(err) => {
                    warn!(token, %err, "timeout submission failed");
                    // No timer was armed, so shutdown must not cancel one.
                    self.conns[token].timeout_cancelled = true;
                    self.begin_shutdown(token);
                }
            }
            if self.conns.get(token).is_some_and(|c| !c.closing) {
                self.arm_read(token);
            }
        } else {
            warn!(errno = -result, "accept failed");
        }

        // The listener always has exactly one accept outstanding.
        if let Err(err) = self.driver.submit_accept(self.listener_fd) {
            error!(%err, "accept resubmission failed; no new connections will be admitted");
        }
    }

    fn on_read(&mut self, token: ConnToken, result: i32) {
        let Some(conn) = self.conns.get_mut(token) else {
            return;
        };
        conn.pending_ops -= 1;
        if conn.closing {
            self.maybe_finalize(token);
            return;
        }
        if result <= 0 {
            // 0 is a clean EOF; either way the connection is over.
            if result < 0 {
                debug!(token, errno = -result, "read failed");
            }
            self.begin_shutdown(token);
            return;
        }

        match feed_read(conn, result as usize) {
            Next::ArmRead => self.arm_read(token),
            Next::Handle(body) => self.on_packet(token, body),
            Next::Violation(reason) => {
                let conn = &self.conns[token];
                debug!(
                    token,
                    reason,
                    phase = ?conn.phase,
                    pending_ops = conn.pending_ops,
                    "framing violation"
                );
                self.begin_shutdown(token);
            }
        }
    }

    fn on_packet(&mut self, token: ConnToken, body: Vec<u8>) {
        let result = {
            let Self {
                conns,
                host,
                secret,
                ..
            } = self;
            let conn = &mut conns[token];
            handler::handle_packet(host, conn, ConnId(token), &body, secret)
        };

        match result {
            Ok(reply) => {
                if let Some(packet) = reply {
                    self.queue_write(token, packet);
                }
                self.after_packet(token);
            }
            Err(reject) => {
                if let Some(conn) = self.conns.get(token) {
                    debug!(
                        token,
                        reject = ?reject,
                        phase = ?conn.phase,
                        pending_ops = conn.pending_ops,
                        "protocol violation"
                    );
                }
                self.begin_shutdown(token);
            }
        }
    }

    /// Housekeeping after a successfully handled packet: retire the login
    /// timer once the sequence is complete, and keep a read armed.
    fn after_packet(&mut self, token: ConnToken) {
        let Some(conn) = self.conns.get(token) else {
            return;
        };
        if conn.phase == Phase::LoginSuccessPending && !conn.timeout_cancelled {
            self.cancel_timeout(token);
        }
        if self.conns.get(token).is_some_and(|c| !c.closing) {
            self.arm_read(token);
        }
    }

    fn on_write(&mut self, token: ConnToken, result: i32) {
        let Some(conn) = self.conns.get_mut(token) else {
            return;
        };
        conn.pending_ops -= 1;
        if conn.closing {
            self.maybe_finalize(token);
            return;
        }
        if result <= 0 {
            // Teardown is driven by the read side, which fails alongside.
            debug!(token, errno = -result, "write failed");
            return;
        }
        let Some(packet) = conn.pending_out.as_mut() else {
            return;
        };
        packet.advance(result as usize);
        if !packet.is_flushed() {
            self.arm_write(token);
            return;
        }

        conn.pending_out = None;
        let player = conn.player;
        if conn.phase == Phase::LoginSuccessPending {
            conn.phase = Phase::Play;
        }
        if let Some(player) = player {
            self.host.on_write_finish(ConnId(token), player);
        }
    }

    fn on_timeout(&mut self, token: ConnToken, result: i32) {
        let Some(conn) = self.conns.get_mut(token) else {
            return;
        };
        conn.pending_ops -= 1;
        if result == -libc::ECANCELED {
            self.maybe_finalize(token);
            return;
        }
        // Genuine fire; there is no timer left to cancel.
        conn.timeout_cancelled = true;
        if conn.closing {
            self.maybe_finalize(token);
            return;
        }
        debug!(token, "login deadline passed");
        self.begin_shutdown(token);
    }

    fn on_timeout_cancel(&mut self, token: ConnToken) {
        let Some(conn) = self.conns.get_mut(token) else {
            return;
        };
        conn.pending_ops -= 1;
        self.maybe_finalize(token);
    }

    fn arm_read(&mut self, token: ConnToken) {
        let Some(conn) = self.conns.get_mut(token) else {
            return;
        };
        let fd = conn.fd;
        let (ptr, len) = match &mut conn.framing {
            Framing::ReadingHeader {
                header_buf,
                header_len,
                ..
            } => {
                if *header_len == 0 {
                    (header_buf.as_mut_ptr(), HEADER_BUF_LEN as u32)
                } else {
                    // One continuation byte consumed; fetch the next byte.
                    (
                        // SAFETY: header_len < HEADER_BUF_LEN, enforced by the
                        // framer's limit check.
                        unsafe { header_buf.as_mut_ptr().add(*header_len) },
                        1,
                    )
                }
            }
            Framing::ReadingBody { buf, received } => (
                // SAFETY: received < buf.len() whenever a body read is armed.
                unsafe { buf.as_mut_ptr().add(*received) },
                (buf.len() - *received) as u32,
            ),
        };

        // SAFETY: the buffer lives inside the boxed connection, which is not
        // reclaimed while this operation is in flight.
        let submitted = unsafe { self.driver.submit_read(token, fd, ptr, len) };
        match submitted {
            Ok(()) => self.conns[token].pending_ops += 1,
            Err(err) => {
                warn!(token, %err, "read submission failed");
                self.begin_shutdown(token);
            }
        }
    }

    fn queue_write(&mut self, token: ConnToken, packet: PacketOut) {
        let Some(conn) = self.conns.get_mut(token) else {
            return;
        };
        if conn.closing {
            return;
        }
        debug_assert!(conn.pending_out.is_none(), "overlapping write");
        if conn.pending_out.is_some() {
            return;
        }
        conn.pending_out = Some(packet);
        self.arm_write(token);
    }

    fn arm_write(&mut self, token: ConnToken) {
        let Some(conn) = self.conns.get_mut(token) else {
            return;
        };
        let fd = conn.fd;
        let Some(packet) = conn.pending_out.as_ref() else {
            return;
        };
        let span = packet.unwritten();
        let (ptr, len) = (span.as_ptr(), span.len() as u32);

        // SAFETY: the packet buffer is held in pending_out until flushed.
        let submitted = unsafe { self.driver.submit_write(token, fd, ptr, len) };
        match submitted {
            Ok(()) => self.conns[token].pending_ops += 1,
            Err(err) => {
                warn!(token, %err, "write submission failed");
                self.begin_shutdown(token);
            }
        }
    }

    fn cancel_timeout(&mut self, token: ConnToken) {
        match self.driver.submit_timeout_cancel(token) {
            Ok(()) => {
                let conn = &mut self.conns[token];
                conn.timeout_cancelled = true;
                conn.pending_ops += 1;
            }
            Err(err) => warn!(token, %err, "timeout cancel submission failed"),
        }
    }

    fn begin_shutdown(&mut self, token: ConnToken) {
        let Some(conn) = self.conns.get_mut(token) else {
            return;
        };
        if conn.closing {
            return;
        }
        conn.closing = true;
        let fd = conn.fd;
        let cancel = !conn.timeout_cancelled;
        if cancel {
            self.cancel_timeout(token);
        }
        self.driver.shutdown(fd);
        self.maybe_finalize(token);
    }

    /// The single reclamation point: a closing connection whose in-flight
    /// operations have all completed.
    fn maybe_finalize(&mut self, token: ConnToken) {
        let Some(conn) = self.conns.get(token) else {
            return;
        };
        if !conn.closing || conn.pending_ops != 0 {
            return;
        }
        let conn = self.conns.remove(token);
        debug!(token, fd = conn.fd, "connection finalized");
        // SAFETY: the fd came from accept and this is its only close.
        drop(unsafe { OwnedFd::from_raw_fd(conn.fd) });
    }
}

impl<H: HostHandler, D: IoDriver> Drop for Engine<H, D> {
    fn drop(&mut self) {
        for conn in self.conns.drain() {
            // SAFETY: each accepted fd is owned by exactly one connection.
            drop(unsafe { OwnedFd::from_raw_fd(conn.fd) });
        }
    }
}

/// Advance the framing state by `n` freshly read bytes.
fn feed_read<P>(conn: &mut Connection<P>, n: usize) -> Next {
    match &mut conn.framing {
        Framing::ReadingBody { buf, received } => {
            *received += n;
            if *received < buf.len() {
                return Next::ArmRead;
            }
            let body = mem::take(buf);
            conn.framing = Framing::new_header();
            Next::Handle(body)
        }
        Framing::ReadingHeader { .. } => feed_header(conn, n),
    }
}

/// Run the varint length-header decoder over `n` new bytes. The first header
/// read asks for two bytes, so a short packet can arrive as header plus first
/// body byte in one completion; that byte is folded into the body here.
fn feed_header<P>(conn: &mut Connection<P>, n: usize) -> Next {
    let Framing::ReadingHeader {
        header_buf,
        header_len,
        body_len,
    } = &conn.framing
    else {
        return Next::Violation("header bytes outside header state");
    };
    let header_buf = *header_buf;
    let mut header_len = *header_len;
    let mut body_len = *body_len;

    let start = header_len;
    for j in 0..n {
        let idx = start + j;
        let byte = header_buf[idx];
        body_len |= ((byte & 0x7F) as usize) << (7 * idx);
        if byte & 0x80 != 0 {
            // Continuation byte; enforce the phase's header width before
            // reading further.
            if idx + 1 >= conn.header_len_limit {
                return Next::Violation("length header exceeds phase limit");
            }
            header_len = idx + 1;
            continue;
        }

        if body_len == 0 {
            return Next::Violation("zero-length packet");
        }
        let extra = &header_buf[idx + 1..start + n];
        let mut buf = Vec::new();
        if buf.try_reserve_exact(body_len).is_err() {
            return Next::Violation("body allocation failed");
        }
        buf.extend_from_slice(extra);
        if buf.len() == body_len {
            conn.framing = Framing::new_header();
            return Next::Handle(buf);
        }
        let received = buf.len();
        buf.resize(body_len, 0);
        conn.framing = Framing::ReadingBody { buf, received };
        return Next::ArmRead;
    }

    conn.framing = Framing::ReadingHeader {
        header_buf,
        header_len,
        body_len,
    };
    Next::ArmRead
}
