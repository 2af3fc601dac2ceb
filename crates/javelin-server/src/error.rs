//! Initialization error taxonomy.
//!
//! Per-connection failures never surface here; they end the connection
//! silently. Only socket, bind and ring setup report to the caller, and the
//! server is never partially constructed on failure.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("address already in use")]
    AddressInUse,

    #[error("resource limit reached: {0}")]
    ResourceLimited(io::Error),

    #[error("platform or feature unsupported: {0}")]
    Unsupported(String),

    #[error("unknown I/O error: {0}")]
    Unknown(io::Error),
}

impl ServerError {
    /// Classify a setup-time I/O error into the closed taxonomy.
    pub(crate) fn classify(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::AddrInUse => ServerError::AddressInUse,
            io::ErrorKind::PermissionDenied | io::ErrorKind::OutOfMemory => {
                ServerError::ResourceLimited(err)
            }
            io::ErrorKind::Unsupported => ServerError::Unsupported(err.to_string()),
            _ => match err.raw_os_error() {
                Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM | libc::EACCES) => {
                    ServerError::ResourceLimited(err)
                }
                Some(libc::EAFNOSUPPORT | libc::EPROTONOSUPPORT | libc::ENOSYS) => {
                    ServerError::Unsupported(err.to_string())
                }
                _ => ServerError::Unknown(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_tables() {
        assert!(matches!(
            ServerError::classify(io::Error::from(io::ErrorKind::AddrInUse)),
            ServerError::AddressInUse
        ));
        assert!(matches!(
            ServerError::classify(io::Error::from_raw_os_error(libc::EMFILE)),
            ServerError::ResourceLimited(_)
        ));
        assert!(matches!(
            ServerError::classify(io::Error::from_raw_os_error(libc::ENOSYS)),
            ServerError::Unsupported(_)
        ));
        assert!(matches!(
            ServerError::classify(io::Error::from_raw_os_error(libc::EPIPE)),
            ServerError::Unknown(_)
        ));
    }
}
