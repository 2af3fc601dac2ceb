//! io_uring backend.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::ptr;

use io_uring::{opcode, squeue, types, IoUring};

use super::{Completion, ConnToken, IoDriver, OpKind};

const RING_ENTRIES: u32 = 2048;

// Operation kind packed into the low bits of each SQE's user_data; the
// connection token lives in the rest.
const OP_ACCEPT: u64 = 0;
const OP_READ: u64 = 1;
const OP_WRITE: u64 = 2;
const OP_TIMEOUT: u64 = 3;
const OP_TIMEOUT_CANCEL: u64 = 4;
const OP_BITS: u32 = 3;
const OP_MASK: u64 = (1 << OP_BITS) - 1;

fn encode_user_data(op: u64, token: ConnToken) -> u64 {
    (token as u64) << OP_BITS | op
}

fn decode_user_data(user_data: u64) -> (u64, ConnToken) {
    (user_data & OP_MASK, (user_data >> OP_BITS) as ConnToken)
}

pub struct UringDriver {
    ring: IoUring,
    /// Timespecs referenced by in-flight timeout SQEs, boxed so the kernel
    /// sees a stable address for the life of the operation.
    timeout_specs: HashMap<ConnToken, Box<types::Timespec>>,
}

impl UringDriver {
    pub fn new() -> io::Result<Self> {
        let ring = IoUring::new(RING_ENTRIES)?;
        if !ring.params().is_feature_fast_poll() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "io_uring lacks the FAST_POLL feature",
            ));
        }
        Ok(Self {
            ring,
            timeout_specs: HashMap::new(),
        })
    }

    fn push(&mut self, entry: &squeue::Entry) -> io::Result<()> {
        // SAFETY: callers uphold the buffer-validity contracts of the ops
        // they build; pushing the entry itself has no other requirements.
        unsafe {
            if self.ring.submission().push(entry).is_ok() {
                return Ok(());
            }
            // Queue full: flush to the kernel and retry once.
            self.ring.submit()?;
            self.ring
                .submission()
                .push(entry)
                .map_err(|_| io::Error::other("submission queue full"))
        }
    }
}

impl IoDriver for UringDriver {
    fn submit_accept(&mut self, listener: RawFd) -> io::Result<()> {
        let entry = opcode::Accept::new(types::Fd(listener), ptr::null_mut(), ptr::null_mut())
            .build()
            .user_data(encode_user_data(OP_ACCEPT, 0));
        self.push(&entry)
    }

    unsafe fn submit_read(
        &mut self,
        token: ConnToken,
        fd: RawFd,
        buf: *mut u8,
        len: u32,
    ) -> io::Result<()> {
        let entry = opcode::Recv::new(types::Fd(fd), buf, len)
            .build()
            .user_data(encode_user_data(OP_READ, token));
        self.push(&entry)
    }

    unsafe fn submit_write(
        &mut self,
        token: ConnToken,
        fd: RawFd,
        buf: *const u8,
        len: u32,
    ) -> io::Result<()> {
        let entry = opcode::Send::new(types::Fd(fd), buf, len)
            .build()
            .user_data(encode_user_data(OP_WRITE, token));
        self.push(&entry)
    }

    fn submit_timeout(&mut self, token: ConnToken, secs: u32) -> io::Result<()> {
        let ts = Box::new(types::Timespec::new().sec(secs as u64));
        let entry = opcode::Timeout::new(&*ts)
            .build()
            .user_data(encode_user_data(OP_TIMEOUT, token));
        self.timeout_specs.insert(token, ts);
        self.push(&entry)
    }

    fn submit_timeout_cancel(&mut self, token: ConnToken) -> io::Result<()> {
        let entry = opcode::TimeoutRemove::new(encode_user_data(OP_TIMEOUT, token))
            .build()
            .user_data(encode_user_data(OP_TIMEOUT_CANCEL, token));
        self.push(&entry)
    }

    fn shutdown(&mut self, fd: RawFd) {
        // SAFETY: plain syscall on a descriptor the engine still owns.
        unsafe {
            libc::shutdown(fd, libc::SHUT_RDWR);
        }
    }

    fn drain_completions(&mut self, out: &mut Vec<Completion>, wait: bool) -> io::Result<()> {
        if wait {
            self.ring.submit_and_wait(1)?;
        } else {
            self.ring.submit()?;
        }

        let Self {
            ring,
            timeout_specs,
        } = self;
        for cqe in ring.completion() {
            let (op, token) = decode_user_data(cqe.user_data());
            let kind = match op {
                OP_ACCEPT => OpKind::Accept,
                OP_READ => OpKind::Read,
                OP_WRITE => OpKind::Write,
                OP_TIMEOUT => {
                    timeout_specs.remove(&token);
                    OpKind::Timeout
                }
                OP_TIMEOUT_CANCEL => OpKind::TimeoutCancel,
                _ => continue,
            };
            out.push(Completion {
                kind,
                token,
                result: cqe.result(),
            });
        }
        Ok(())
    }
}
