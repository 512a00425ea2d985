//! ftpscope-core - Core library for ftpscope
//!
//! Pooled FTP client, listing and content caches, day-folder discovery,
//! keyword value extraction and machine runtime estimation for measurement
//! files published by machine controllers.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod ftp;
pub mod models;
pub mod runtime;
pub mod tokens;

pub use analysis::{
    AnalysisEvent, AnalysisOutcome, AnalysisReport, AnalysisRequest, AnalysisService,
    ProgressReporter, Stage,
};
pub use config::Settings;
pub use error::{CoreError, CoreResult};
pub use extract::{extract_value, KeywordMatcher};
pub use ftp::{ConnectionPool, Connector, FtpConnector, FtpSession, SessionError};
pub use models::{AnalyzedPoint, RemoteFile};
pub use runtime::{estimate_machine_runtime, RuntimeEstimate};
pub use tokens::TokenStore;
