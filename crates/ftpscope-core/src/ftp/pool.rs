//! Bounded pool of FTP sessions with lazy validation and retry
//!
//! At most `max_connections` sessions are alive at once: a semaphore permit is
//! taken before a session is borrowed or created, so excess callers queue
//! instead of failing. Idle sessions are health-checked before reuse and
//! replaced when the check fails. Protocol calls block, so each one runs on
//! `spawn_blocking` with the borrowed session moved into the closure.

use super::client::FtpConnector;
use super::listing;
use super::session::{Connector, FtpSession, SessionError};
use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::models::{normalize_path, RemoteFile};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, warn};

/// Callback receiving the number of bytes transferred so far
pub type ByteProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// Attempt ceiling and exponential backoff for transient protocol errors
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): base, 2*base, 4*base...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Pool sizing and transfer parameters
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
}

impl PoolConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_connections: settings.max_connections.max(1),
            chunk_size: settings.chunk_size.max(1),
            retry: RetryPolicy {
                base_delay: settings.retry_base_delay(),
                ..RetryPolicy::default()
            },
        }
    }
}

struct IdleSession<S> {
    session: S,
    last_used: Instant,
}

struct PoolShared<C: Connector> {
    connector: C,
    idle: Mutex<VecDeque<IdleSession<C::Session>>>,
    permits: Arc<Semaphore>,
    config: PoolConfig,
}

impl<C: Connector> PoolShared<C> {
    /// Reuse a validated idle session or open a fresh one (blocking)
    fn checkout(&self, idle: Option<IdleSession<C::Session>>) -> CoreResult<C::Session> {
        if let Some(mut idle) = idle {
            if self.connector.validate(&mut idle.session) {
                debug!(idle_for = ?idle.last_used.elapsed(), "Reusing pooled FTP session");
                return Ok(idle.session);
            }
            warn!("FTP session failed validation, recreating");
            idle.session.quit();
        }

        self.connector.connect().map_err(|source| {
            let (host, port) = self.connector.endpoint();
            CoreError::Connect { host, port, source }
        })
    }

    /// Put a session back, or close it when the idle queue is already full
    fn release(&self, mut session: C::Session) {
        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_connections {
            idle.push_back(IdleSession {
                session,
                last_used: Instant::now(),
            });
        } else {
            drop(idle);
            session.quit();
        }
    }
}

/// A session borrowed from the pool
///
/// Returned to the pool when dropped; [`PooledSession::discard`] closes it
/// instead. The semaphore permit is released after the session is back.
pub struct PooledSession<C: Connector> {
    session: Option<C::Session>,
    shared: Arc<PoolShared<C>>,
    _permit: OwnedSemaphorePermit,
}

impl<C: Connector> PooledSession<C> {
    pub fn session(&mut self) -> &mut C::Session {
        self.session
            .as_mut()
            .expect("session is only taken by discard or drop")
    }

    /// Close the session instead of returning it
    pub fn discard(mut self) {
        if let Some(mut session) = self.session.take() {
            session.quit();
        }
    }
}

impl<C: Connector> Drop for PooledSession<C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.shared.release(session);
        }
    }
}

/// Connection-pooled, retrying FTP client for one remote host
pub struct ConnectionPool<C: Connector = FtpConnector> {
    shared: Arc<PoolShared<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl ConnectionPool<FtpConnector> {
    /// Pool of real FTP sessions configured from settings
    pub fn from_settings(settings: Arc<Settings>) -> Self {
        let config = PoolConfig::from_settings(&settings);
        Self::new(FtpConnector::new(settings), config)
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C, config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                connector,
                idle: Mutex::new(VecDeque::with_capacity(config.max_connections)),
                permits: Arc::new(Semaphore::new(config.max_connections)),
                config,
            }),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.shared.config.max_connections
    }

    /// Sessions currently parked in the idle queue
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().len()
    }

    pub fn connector(&self) -> &C {
        &self.shared.connector
    }

    /// Borrow a validated session, waiting while the pool is at capacity
    pub async fn acquire(&self) -> CoreResult<PooledSession<C>> {
        let permit = Arc::clone(&self.shared.permits)
            .acquire_owned()
            .await
            .map_err(|_| CoreError::TaskFailed {
                message: "connection pool closed".to_string(),
            })?;

        let idle = self.shared.idle.lock().pop_back();
        let shared = Arc::clone(&self.shared);
        let session = tokio::task::spawn_blocking(move || shared.checkout(idle))
            .await
            .map_err(CoreError::task)??;

        Ok(PooledSession {
            session: Some(session),
            shared: Arc::clone(&self.shared),
            _permit: permit,
        })
    }

    /// Run a blocking protocol operation with retry on transient errors
    ///
    /// A session that saw any error is discarded rather than reused.
    async fn run<T, F>(&self, operation: &'static str, path: &str, op: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: Fn(&mut C::Session) -> Result<T, SessionError> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let retry = self.shared.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut pooled = self.acquire().await?;
            let op = Arc::clone(&op);

            let outcome = tokio::task::spawn_blocking(move || {
                let result = op(pooled.session());
                if result.is_err() {
                    pooled.discard();
                }
                result
            })
            .await
            .map_err(CoreError::task)?;

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                    let delay = retry.delay_after(attempt);
                    warn!(operation, path, attempt, ?delay, error = %e, "FTP operation failed, retrying");
                    sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    error!(operation, path, attempts = attempt, error = %e, "FTP retries exhausted");
                    return Err(CoreError::RetriesExhausted {
                        operation,
                        path: path.to_string(),
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    error!(operation, path, error = %e, "FTP operation failed");
                    return Err(CoreError::Remote {
                        operation,
                        path: path.to_string(),
                        source: e,
                    });
                }
            }
        }
    }

    /// List a remote directory (MLSD with NLST fallback)
    pub async fn list_directory(&self, path: &str) -> CoreResult<Vec<RemoteFile>> {
        let path = normalize_path([path]);
        let dir = path.clone();
        self.run("list", &path, move |session| {
            listing::list_directory(session, &dir)
        })
        .await
    }

    /// Download a remote file into `local_path`, reporting bytes per chunk
    ///
    /// Each attempt truncates the local file. A failed download may leave a
    /// partial file behind.
    pub async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        on_progress: Option<ByteProgress>,
    ) -> CoreResult<u64> {
        let remote = normalize_path([remote_path]);
        let target: PathBuf = local_path.to_path_buf();
        let chunk_size = self.shared.config.chunk_size;
        let source = remote.clone();

        let bytes = self
            .run("download", &remote, move |session| {
                let mut file = File::create(&target)?;
                let mut report = |total: u64| {
                    if let Some(callback) = &on_progress {
                        callback(total);
                    }
                };
                session.retrieve(&source, &mut file, chunk_size, &mut report)
            })
            .await?;

        debug!(remote = %remote, local = %local_path.display(), bytes, "Download complete");
        Ok(bytes)
    }

    /// True when a session can be obtained and answers the health check
    pub async fn health_check(&self) -> bool {
        let mut pooled = match self.acquire().await {
            Ok(pooled) => pooled,
            Err(e) => {
                error!(error = %e, "Failed to get FTP session for health check");
                return false;
            }
        };

        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            let healthy = shared.connector.validate(pooled.session());
            if !healthy {
                pooled.discard();
            }
            healthy
        })
        .await
        .unwrap_or(false)
    }
}
