//! Day-folder discovery, file selection and concurrent download + extraction

use super::progress::{AnalysisEvent, ProgressReporter, Stage};
use super::report::{
    mean_of, AnalysisOutcome, AnalysisReport, AnalysisRequest, FileFailure, LatestFile, Selection,
};
use crate::cache::{ContentCache, DirectoryCache};
use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::extract::KeywordMatcher;
use crate::ftp::{is_plain_name, ByteProgress, ConnectionPool, Connector, FtpConnector, PoolConfig};
use crate::models::{looks_like_day_folder, machine_root, parse_day, AnalyzedPoint, RemoteFile};
use crate::runtime::{range_total_hours, span_total_hours};
use crate::tokens::TokenStore;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Buffer of the event channel returned by [`AnalysisService::spawn_analysis`]
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Folder name used for files that sit directly under `/`
const ROOT_FOLDER: &str = "_root";

/// Orchestrates listing, selection, download and extraction for one FTP host
///
/// Cloning is cheap and shares the pool, caches and token store.
pub struct AnalysisService<C: Connector = FtpConnector> {
    settings: Arc<Settings>,
    pool: ConnectionPool<C>,
    listings: Arc<DirectoryCache>,
    contents: Arc<ContentCache>,
    tokens: Arc<TokenStore>,
    work_root: Option<PathBuf>,
}

impl<C: Connector> Clone for AnalysisService<C> {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            pool: self.pool.clone(),
            listings: Arc::clone(&self.listings),
            contents: Arc::clone(&self.contents),
            tokens: Arc::clone(&self.tokens),
            work_root: self.work_root.clone(),
        }
    }
}

impl AnalysisService<FtpConnector> {
    /// Validate settings and build a service talking to a real FTP server
    pub fn from_settings(settings: Settings) -> CoreResult<Self> {
        settings.validate()?;
        let settings = Arc::new(settings);
        let pool = ConnectionPool::from_settings(Arc::clone(&settings));
        Ok(Self::new(settings, pool))
    }
}

/// Everything one per-file task needs, owned so it can be spawned
struct FileJob<C: Connector> {
    index: usize,
    total: usize,
    file: RemoteFile,
    batch_dir: PathBuf,
    pool: ConnectionPool<C>,
    contents: Arc<ContentCache>,
    tokens: Arc<TokenStore>,
    matcher: KeywordMatcher,
    progress: ProgressReporter,
}

/// What a successful per-file task hands back
struct FileResult {
    remote_path: String,
    token: String,
    point: Option<AnalyzedPoint>,
}

impl<C: Connector> FileJob<C> {
    async fn run(self) -> CoreResult<FileResult> {
        let FileJob {
            index,
            total,
            file,
            batch_dir,
            pool,
            contents,
            tokens,
            matcher,
            progress,
        } = self;

        let local_path = local_path_for(&batch_dir, &file)?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CoreError::FileWrite {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let expected = file.size.unwrap_or(1).max(1) as f64;
        let download_progress = progress.clone();
        let on_bytes: ByteProgress = Arc::new(move |bytes| {
            let fraction = (index as f64 + bytes as f64 / expected) / total as f64;
            download_progress.report(fraction, Stage::Downloading);
        });
        pool.download_file(&file.path, &local_path, Some(on_bytes)).await?;

        let text = contents.read(&local_path, file.size).await?;
        let token = tokens.issue(&local_path);
        let value = matcher.extract(&text);
        progress.report(
            ((index + 1) as f64 / total as f64).min(0.999),
            Stage::Extracting,
        );

        let point = value.map(|value| AnalyzedPoint {
            idx: index + 1,
            value,
            label: file.name.clone(),
            time_iso: file
                .modified
                .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
                .unwrap_or_default(),
            local_path: local_path.clone(),
            remote_path: file.path.clone(),
        });
        if point.is_none() {
            debug!(path = %file.path, "No value found");
        }

        Ok(FileResult {
            remote_path: file.path,
            token,
            point,
        })
    }
}

impl<C: Connector> AnalysisService<C> {
    pub fn new(settings: Arc<Settings>, pool: ConnectionPool<C>) -> Self {
        Self {
            listings: Arc::new(DirectoryCache::with_capacity(
                settings.listing_cache_capacity,
                settings.cache_ttl(),
            )),
            contents: Arc::new(ContentCache::new(settings.content_cache_size)),
            tokens: Arc::new(TokenStore::new(settings.token_ttl())),
            settings,
            pool,
            work_root: None,
        }
    }

    /// Build a service over a custom connector using the settings' pool sizing
    pub fn with_connector(settings: Arc<Settings>, connector: C) -> Self {
        let pool = ConnectionPool::new(connector, PoolConfig::from_settings(&settings));
        Self::new(settings, pool)
    }

    /// Create batch directories under `dir` instead of the system temp dir
    pub fn with_work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_root = Some(dir.into());
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn listings(&self) -> &DirectoryCache {
        &self.listings
    }

    /// Machine ids accepted by this service
    pub fn machines(&self) -> Vec<u32> {
        (1..=self.settings.allowed_machines).collect()
    }

    pub fn validate_machine(&self, machine: u32) -> CoreResult<()> {
        if (1..=self.settings.allowed_machines).contains(&machine) {
            Ok(())
        } else {
            Err(CoreError::InvalidMachine {
                machine,
                allowed: self.settings.allowed_machines,
            })
        }
    }

    pub async fn health(&self) -> bool {
        self.pool.health_check().await
    }

    /// Day-folders of a machine, oldest first
    ///
    /// Cached under the machine root for the listing TTL.
    pub async fn list_days(&self, machine: u32) -> CoreResult<Arc<Vec<RemoteFile>>> {
        let root = machine_root(machine);
        if let Some(cached) = self.listings.get(&root) {
            return Ok(cached);
        }

        let entries = self.pool.list_directory(&root).await?;
        let mut folders: Vec<RemoteFile> = entries
            .into_iter()
            .filter(|entry| entry.is_dir() || looks_like_day_folder(&entry.name))
            .collect();
        folders.sort_by_key(RemoteFile::modified_or_min);

        debug!(machine, folders = folders.len(), "Listed day folders");
        Ok(self.listings.set(&root, folders))
    }

    async fn data_files(&self, folder: &RemoteFile) -> CoreResult<Vec<RemoteFile>> {
        let entries = self.pool.list_directory(&folder.path).await?;
        Ok(entries.into_iter().filter(RemoteFile::is_data_file).collect())
    }

    /// Data files from day-folders dated within `[start, end]`, oldest first
    ///
    /// Folders whose names are not `DD-MM-YY` dates are skipped.
    pub async fn gather_files_in_range(
        &self,
        machine: u32,
        start: &str,
        end: &str,
    ) -> CoreResult<Vec<RemoteFile>> {
        let start = parse_request_date(start)?;
        let end = parse_request_date(end)?;

        let folders = self.list_days(machine).await?;
        let mut selected = Vec::new();
        for folder in folders.iter() {
            let Ok(day) = parse_day(&folder.name) else {
                debug!(folder = %folder.name, "Skipping folder without a date name");
                continue;
            };
            if start <= day && day <= end {
                selected.extend(self.data_files(folder).await?);
            }
        }

        selected.sort_by_key(RemoteFile::modified_or_min);
        Ok(selected)
    }

    /// The `count` most recent data files across all day-folders, oldest first
    pub async fn gather_files_latest(
        &self,
        machine: u32,
        count: usize,
    ) -> CoreResult<Vec<RemoteFile>> {
        let folders = self.list_days(machine).await?;
        let mut all = Vec::new();
        for folder in folders.iter() {
            all.extend(self.data_files(folder).await?);
        }

        all.sort_by_key(|f| std::cmp::Reverse(f.modified_or_min()));
        all.truncate(count);
        all.sort_by_key(RemoteFile::modified_or_min);
        Ok(all)
    }

    fn create_batch_dir(&self) -> CoreResult<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ftpscope_");
        let dir = match &self.work_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|source| CoreError::WorkDir { source })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|source| CoreError::WorkDir { source })?;

        // Downloads must outlive this call so tokens stay resolvable
        Ok(dir.keep())
    }

    /// Download every file concurrently and extract the keyword's value
    ///
    /// Each file runs as its own task; the pool's connection ceiling bounds
    /// how many transfer at once. A file that fails is recorded in
    /// `failures` and does not abort the others.
    pub async fn download_and_analyze(
        &self,
        files: &[RemoteFile],
        keyword: &str,
        progress: &ProgressReporter,
    ) -> CoreResult<AnalysisOutcome> {
        if files.is_empty() {
            return Ok(AnalysisOutcome::default());
        }

        let matcher = KeywordMatcher::new(keyword)?;
        let batch_dir = self.create_batch_dir()?;
        let total = files.len();
        info!(files = total, dir = %batch_dir.display(), "Starting download batch");

        let handles: Vec<_> = files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let job = FileJob {
                    index,
                    total,
                    file: file.clone(),
                    batch_dir: batch_dir.clone(),
                    pool: self.pool.clone(),
                    contents: Arc::clone(&self.contents),
                    tokens: Arc::clone(&self.tokens),
                    matcher: matcher.clone(),
                    progress: progress.clone(),
                };
                (file.path.clone(), tokio::spawn(job.run()))
            })
            .collect();

        let mut outcome = AnalysisOutcome {
            files: files.to_vec(),
            work_dir: Some(batch_dir),
            ..AnalysisOutcome::default()
        };

        for (remote_path, handle) in handles {
            let result = handle.await.map_err(CoreError::task).and_then(|r| r);
            match result {
                Ok(file) => {
                    outcome.tokens.insert(file.remote_path, file.token);
                    outcome.points.extend(file.point);
                }
                Err(e) => {
                    warn!(path = %remote_path, error = %e, "File failed, continuing batch");
                    outcome.failures.push(FileFailure {
                        remote_path,
                        reason: e.detailed(),
                    });
                }
            }
        }

        outcome.points.sort_by_key(|p| p.idx);
        outcome.mean = mean_of(&outcome.points);

        info!(
            files = total,
            points = outcome.points.len(),
            failures = outcome.failures.len(),
            "Download batch complete"
        );
        Ok(outcome)
    }

    /// Analyze every file of the day-folders within `[start, end]`
    pub async fn analyze_date_range(
        &self,
        machine: u32,
        start: &str,
        end: &str,
        keyword: &str,
        progress: &ProgressReporter,
    ) -> CoreResult<AnalysisOutcome> {
        let files = self.gather_files_in_range(machine, start, end).await?;
        progress.report(0.05, Stage::Listing);
        let mut outcome = self.download_and_analyze(&files, keyword, progress).await?;
        outcome.files = files;
        Ok(outcome)
    }

    /// Analyze the `count` most recent files
    pub async fn analyze_latest(
        &self,
        machine: u32,
        count: usize,
        keyword: &str,
        progress: &ProgressReporter,
    ) -> CoreResult<AnalysisOutcome> {
        let files = self.gather_files_latest(machine, count).await?;
        progress.report(0.05, Stage::Listing);
        let mut outcome = self.download_and_analyze(&files, keyword, progress).await?;
        outcome.files = files;
        Ok(outcome)
    }

    /// Validate a request, run it and build the report
    pub async fn run(
        &self,
        request: &AnalysisRequest,
        progress: &ProgressReporter,
    ) -> CoreResult<AnalysisReport> {
        self.validate_machine(request.machine)?;
        let selection = request.selection()?;

        let (outcome, total_hours) = match selection {
            Selection::DateRange { start, end } => {
                let outcome = self
                    .analyze_date_range(request.machine, &start, &end, &request.keyword, progress)
                    .await?;
                let hours = range_total_hours(parse_request_date(&start)?, parse_request_date(&end)?);
                (outcome, hours)
            }
            Selection::Latest { count } => {
                let outcome = self
                    .analyze_latest(request.machine, count, &request.keyword, progress)
                    .await?;
                let hours = span_total_hours(&outcome.files);
                (outcome, hours)
            }
        };

        Ok(AnalysisReport::from_outcome(&outcome, total_hours))
    }

    /// Run a request in the background, streaming progress then one terminal event
    ///
    /// Dropping the receiver does not cancel the batch.
    pub fn spawn_analysis(&self, request: AnalysisRequest) -> mpsc::Receiver<AnalysisEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let service = self.clone();

        tokio::spawn(async move {
            let reporter = ProgressReporter::channel(tx.clone());
            reporter.report(0.01, Stage::Listing);

            let terminal = match service.run(&request, &reporter).await {
                Ok(report) => AnalysisEvent::Done(report),
                Err(e) => {
                    warn!(machine = request.machine, error = %e, "Analysis failed");
                    AnalysisEvent::Failed {
                        message: e.detailed(),
                        client_error: e.is_client_error(),
                    }
                }
            };
            drop(reporter);

            if tx.send(terminal).await.is_err() {
                debug!("Analysis consumer went away before completion");
            }
        });

        rx
    }

    /// Download the most recent data file and return its text
    ///
    /// `None` when the machine has no data files.
    pub async fn latest_file(&self, machine: u32) -> CoreResult<Option<LatestFile>> {
        self.validate_machine(machine)?;
        let Some(file) = self.gather_files_latest(machine, 1).await?.pop() else {
            return Ok(None);
        };

        let tmp = tempfile::NamedTempFile::new().map_err(|source| CoreError::WorkDir { source })?;
        self.pool.download_file(&file.path, tmp.path(), None).await?;
        let bytes = tokio::fs::read(tmp.path())
            .await
            .map_err(|source| CoreError::FileRead {
                path: tmp.path().to_path_buf(),
                source,
            })?;

        Ok(Some(LatestFile {
            filename: file.name,
            modified: file.modified,
            size: file.size,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        }))
    }

    /// Text of a previously downloaded file, `None` if the token is unknown,
    /// expired, or its file is gone
    pub async fn read_token(&self, token: &str) -> CoreResult<Option<String>> {
        let Some(path) = self.tokens.resolve(token) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CoreError::FileRead { path, source }),
        }
    }
}

fn parse_request_date(value: &str) -> CoreResult<NaiveDate> {
    parse_day(value).map_err(|source| CoreError::InvalidDate {
        value: value.to_string(),
        source,
    })
}

/// `<batch>/<day folder>/<basename>`, keeping equal names from different days apart
///
/// Fails when either component is not a bare name, so the result always
/// stays inside `batch_dir`.
fn local_path_for(batch_dir: &Path, file: &RemoteFile) -> CoreResult<PathBuf> {
    let folder = match file.parent_name() {
        "" => ROOT_FOLDER,
        name => name,
    };
    if !is_plain_name(folder) || !is_plain_name(&file.name) {
        return Err(CoreError::UnsafeRemotePath {
            remote_path: file.path.clone(),
        });
    }

    let path = batch_dir.join(folder).join(&file.name);
    if !path.starts_with(batch_dir) {
        return Err(CoreError::UnsafeRemotePath {
            remote_path: file.path.clone(),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(path: &str) -> RemoteFile {
        RemoteFile {
            name: path.rsplit('/').next().unwrap().to_string(),
            path: path.to_string(),
            modified: None,
            size: None,
            kind: None,
        }
    }

    #[test]
    fn test_local_path_keeps_day_folder() {
        let batch = Path::new("/tmp/ftpscope_x");
        assert_eq!(
            local_path_for(batch, &remote("/rd/001/ftp/01-02-24/LOG_001.DAT")).unwrap(),
            PathBuf::from("/tmp/ftpscope_x/01-02-24/LOG_001.DAT")
        );
        assert_eq!(
            local_path_for(batch, &remote("/A.DAT")).unwrap(),
            PathBuf::from("/tmp/ftpscope_x/_root/A.DAT")
        );
    }

    #[test]
    fn test_local_path_refuses_names_leaving_batch_dir() {
        let batch = Path::new("/tmp/ftpscope_x");
        let hostile = [
            RemoteFile {
                name: "/etc/X.DAT".to_string(),
                path: "/rd/001/ftp/01-02-24/X.DAT".to_string(),
                ..remote("/x")
            },
            RemoteFile {
                name: "../../X.DAT".to_string(),
                ..remote("/rd/001/ftp/01-02-24/X.DAT")
            },
            RemoteFile {
                name: "X.DAT".to_string(),
                ..remote("/rd/001/ftp/../X.DAT")
            },
            RemoteFile {
                name: "..\\X.DAT".to_string(),
                ..remote("/rd/001/ftp/01-02-24/X.DAT")
            },
        ];

        for file in &hostile {
            let err = local_path_for(batch, file).unwrap_err();
            assert!(matches!(err, CoreError::UnsafeRemotePath { .. }), "{:?}", file);
        }
    }

    #[test]
    fn test_request_date_errors_are_client_errors() {
        let err = parse_request_date("2024-02-01").unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(
            parse_request_date("01-02-24").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
    }
}
