//! Session and connector abstractions
//!
//! A session is one authenticated control connection. The pool only talks to
//! sessions through [`FtpSession`], and only creates or health-checks them
//! through [`Connector`], so tests and alternative transports plug in here.

use chrono::NaiveDateTime;
use std::io::Write;
use thiserror::Error;

/// Failure of a single protocol command
#[derive(Error, Debug)]
pub enum SessionError {
    /// 4xx reply: the server asks to try again later
    #[error("temporary failure: {0}")]
    Temporary(String),

    /// Reply code the command did not expect
    #[error("unexpected reply: {0}")]
    Reply(String),

    /// Malformed or unparsable reply
    #[error("protocol error: {0}")]
    Protocol(String),

    /// 5xx reply or other definitive refusal
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Socket or local sink failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Errors worth another attempt with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::Temporary(_) | SessionError::Reply(_) | SessionError::Protocol(_)
        )
    }
}

/// Commands the pool needs from one control connection
pub trait FtpSession: Send + 'static {
    /// Cheap no-op round trip
    fn noop(&mut self) -> Result<(), SessionError>;

    /// Raw MLSD lines for a directory
    fn mlsd(&mut self, path: &str) -> Result<Vec<String>, SessionError>;

    /// Raw NLST names for a directory (may be bare names or full paths)
    fn nlst(&mut self, path: &str) -> Result<Vec<String>, SessionError>;

    /// Modification time of a file
    fn mdtm(&mut self, path: &str) -> Result<NaiveDateTime, SessionError>;

    /// Size of a file in bytes
    fn size(&mut self, path: &str) -> Result<u64, SessionError>;

    /// Binary retrieve into `sink`, reading at most `chunk_size` bytes at a
    /// time and calling `on_chunk` with the running total after each chunk
    fn retrieve(
        &mut self,
        path: &str,
        sink: &mut dyn Write,
        chunk_size: usize,
        on_chunk: &mut dyn FnMut(u64),
    ) -> Result<u64, SessionError>;

    /// Best-effort polite close
    fn quit(&mut self);
}

/// Creates and validates sessions against one remote host
pub trait Connector: Send + Sync + 'static {
    type Session: FtpSession;

    /// Open and authenticate a new session (blocking)
    fn connect(&self) -> Result<Self::Session, SessionError>;

    /// Health check run before an idle session is reused (blocking)
    fn validate(&self, session: &mut Self::Session) -> bool {
        session.noop().is_ok()
    }

    /// Human-readable endpoint for logs and errors
    fn endpoint(&self) -> (String, u16);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SessionError::Temporary("421".into()).is_transient());
        assert!(SessionError::Reply("150".into()).is_transient());
        assert!(SessionError::Protocol("bad".into()).is_transient());
        assert!(!SessionError::Permanent("550".into()).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(!SessionError::from(io).is_transient());
    }
}
