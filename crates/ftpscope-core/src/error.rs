//! Error types for ftpscope-core
//!
//! Missing data (no keyword match, no number, empty folder) is never an error:
//! those surface as `None` or empty collections. Everything here is either a
//! caller mistake or an upstream failure.

use crate::ftp::SessionError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for ftpscope operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // IO Errors
    // ===================
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create working directory")]
    WorkDir {
        #[source]
        source: std::io::Error,
    },

    // ===================
    // Remote Errors
    // ===================
    #[error("FTP {operation} failed for {path}")]
    Remote {
        operation: &'static str,
        path: String,
        #[source]
        source: SessionError,
    },

    #[error("FTP {operation} retries exhausted for {path} after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        path: String,
        attempts: u32,
        #[source]
        last: SessionError,
    },

    #[error("Remote entry {remote_path} would be stored outside the download directory")]
    UnsafeRemotePath { remote_path: String },

    #[error("Failed to open FTP session to {host}:{port}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: SessionError,
    },

    // ===================
    // Input Errors
    // ===================
    #[error("Keyword must contain at least one token: {keyword:?}")]
    EmptyKeyword { keyword: String },

    #[error("Invalid date {value:?} (expected DD-MM-YY)")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid machine {machine} (allowed: 1..={allowed})")]
    InvalidMachine { machine: u32, allowed: u32 },

    #[error("Missing request parameter: {name}")]
    MissingParameter { name: &'static str },

    // ===================
    // Config Errors
    // ===================
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ===================
    // Runtime Errors
    // ===================
    #[error("Background task failed: {message}")]
    TaskFailed { message: String },

    #[error("{failed} of {total} files failed to download or parse")]
    BatchIncomplete { failed: usize, total: usize },
}

impl CoreError {
    /// True for errors caused by the request itself rather than the remote side
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::EmptyKeyword { .. }
                | CoreError::InvalidDate { .. }
                | CoreError::InvalidMachine { .. }
                | CoreError::MissingParameter { .. }
        )
    }

    /// Message including every source in the chain, `outer: inner: root`
    pub fn detailed(&self) -> String {
        use std::error::Error as _;

        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }

    pub(crate) fn task(err: tokio::task::JoinError) -> Self {
        CoreError::TaskFailed {
            message: err.to_string(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
