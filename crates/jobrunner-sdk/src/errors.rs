use std::io;

/// The remote side of a transport or build host has already gone away.
///
/// Plugins return this (wrapped in `anyhow::Error`) from `close` or
/// `release` when there is nothing left to tear down. The job runner treats
/// it as benign during cleanup and logs it instead of failing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("remote end already disconnected: {0}")]
pub struct DisconnectedError(pub String);

impl DisconnectedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Whether `err` (or anything in its cause chain) is a disconnect.
///
/// Broken pipes and reset/aborted/not-connected sockets count as well, since
/// transports built on raw I/O surface them that way.
pub fn is_disconnected(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if cause.is::<DisconnectedError>() {
            return true;
        }
        cause.downcast_ref::<io::Error>().is_some_and(|e| {
            matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
            )
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn detects_direct_disconnect() {
        let err = anyhow::Error::new(DisconnectedError::new("ssh session closed"));
        assert!(is_disconnected(&err));
    }

    #[test]
    fn detects_wrapped_disconnect() {
        let err: anyhow::Result<()> =
            Err(DisconnectedError::new("gone").into());
        let err = err.context("releasing host").unwrap_err();
        assert!(is_disconnected(&err));
    }

    #[test]
    fn detects_broken_pipe() {
        let err = anyhow::Error::new(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(is_disconnected(&err));
    }

    #[test]
    fn other_errors_are_not_disconnects() {
        let err = anyhow::anyhow!("permission denied");
        assert!(!is_disconnected(&err));
        let io_err = anyhow::Error::new(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!is_disconnected(&io_err));
    }
}
