//! Analysis requests, batch outcomes and the serialized report

use crate::error::{CoreError, CoreResult};
use crate::models::{AnalyzedPoint, RemoteFile};
use crate::runtime::estimate_machine_runtime;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// How files are selected for an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Every file in day-folders between two `DD-MM-YY` dates
    Date,
    /// The most recent N files across all day-folders
    LastX,
}

/// Analysis request as received from the outer boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub machine: u32,
    pub keyword: String,
    pub mode: AnalysisMode,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub last_x: Option<usize>,
}

/// Validated file selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    DateRange { start: String, end: String },
    Latest { count: usize },
}

impl AnalysisRequest {
    pub fn date_range(machine: u32, keyword: &str, start: &str, end: &str) -> Self {
        Self {
            machine,
            keyword: keyword.to_string(),
            mode: AnalysisMode::Date,
            start_date: Some(start.to_string()),
            end_date: Some(end.to_string()),
            last_x: None,
        }
    }

    pub fn latest(machine: u32, keyword: &str, count: usize) -> Self {
        Self {
            machine,
            keyword: keyword.to_string(),
            mode: AnalysisMode::LastX,
            start_date: None,
            end_date: None,
            last_x: Some(count),
        }
    }

    /// Selection implied by `mode`, failing when its parameters are missing
    pub fn selection(&self) -> CoreResult<Selection> {
        match self.mode {
            AnalysisMode::Date => {
                let start = self
                    .start_date
                    .clone()
                    .ok_or(CoreError::MissingParameter { name: "startDate" })?;
                let end = self
                    .end_date
                    .clone()
                    .ok_or(CoreError::MissingParameter { name: "endDate" })?;
                Ok(Selection::DateRange { start, end })
            }
            AnalysisMode::LastX => match self.last_x {
                Some(count) if count > 0 => Ok(Selection::Latest { count }),
                _ => Err(CoreError::MissingParameter { name: "lastX" }),
            },
        }
    }
}

/// A file of the batch that could not be downloaded or read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub remote_path: String,
    pub reason: String,
}

/// Result of downloading and analyzing one batch
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    /// Points sorted by index
    pub points: Vec<AnalyzedPoint>,
    /// Mean of point values, `None` without points
    pub mean: Option<f64>,
    /// Token per downloaded file, keyed by remote path
    pub tokens: HashMap<String, String>,
    /// Files the batch covered, in chronological order
    pub files: Vec<RemoteFile>,
    pub failures: Vec<FileFailure>,
    /// Local directory holding the downloads
    pub work_dir: Option<PathBuf>,
}

impl AnalysisOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn any per-file failure into a batch error
    pub fn ensure_complete(&self) -> CoreResult<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(CoreError::BatchIncomplete {
                failed: self.failures.len(),
                total: self.files.len(),
            })
        }
    }

    pub fn token_for(&self, remote_path: &str) -> Option<&str> {
        self.tokens.get(remote_path).map(String::as_str)
    }
}

pub(crate) fn mean_of(points: &[AnalyzedPoint]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    Some(points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64)
}

/// One point as exposed to consumers, with a token in place of the local path
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPoint {
    pub idx: usize,
    pub value: f64,
    pub label: String,
    pub time_iso: String,
    pub local_path_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FtpStatus {
    Ok,
    Error,
}

/// Aggregated answer to an analysis request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub points: Vec<ReportPoint>,
    pub mean: Option<f64>,
    pub total_files: usize,
    pub machine_runtime_percent: f64,
    pub ftp_status: FtpStatus,
    pub latest_file_name: Option<String>,
    pub failures: Vec<FileFailure>,
}

impl AnalysisReport {
    /// Build the report for an outcome whose files span `total_hours`
    pub fn from_outcome(outcome: &AnalysisOutcome, total_hours: f64) -> Self {
        let points = outcome
            .points
            .iter()
            .map(|p| ReportPoint {
                idx: p.idx,
                value: p.value,
                label: p.label.clone(),
                time_iso: p.time_iso.clone(),
                local_path_id: outcome
                    .token_for(&p.remote_path)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect();

        Self {
            points,
            mean: outcome.mean,
            total_files: outcome.files.len(),
            machine_runtime_percent: estimate_machine_runtime(&outcome.files, total_hours).percent,
            ftp_status: FtpStatus::Ok,
            latest_file_name: outcome.files.last().map(|f| f.name.clone()),
            failures: outcome.failures.clone(),
        }
    }
}

/// Most recent data file of a machine, with its text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestFile {
    pub filename: String,
    pub modified: Option<NaiveDateTime>,
    pub size: Option<u64>,
    pub content: String,
}
