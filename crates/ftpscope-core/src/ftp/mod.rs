//! FTP protocol client: sessions, listing, pooling and retry

pub mod client;
pub mod listing;
pub mod pool;
pub mod session;

pub use client::{FtpConnector, FtpControl};
pub use listing::{is_plain_name, parse_mlsd_line};
pub use pool::{ByteProgress, ConnectionPool, PoolConfig, PooledSession, RetryPolicy};
pub use session::{Connector, FtpSession, SessionError};
