//! Data models shared across the pool, the orchestrator and the estimator

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Day-folder naming on the controllers (`DD-MM-YY`)
pub const DAY_FORMAT: &str = "%d-%m-%y";

/// Timestamp format of the MLSD `modify` fact and MDTM replies
pub const MODIFY_FORMAT: &str = "%Y%m%d%H%M%S";

/// Extension of measurement files, compared case-insensitively
pub const DATA_EXTENSION: &str = ".dat";

/// Kind of a directory entry as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
    #[serde(untagged)]
    Other(String),
}

impl EntryKind {
    /// Map an MLSD `type` fact to an entry kind
    pub fn from_fact(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "dir" => EntryKind::Dir,
            "file" => EntryKind::File,
            other => EntryKind::Other(other.to_string()),
        }
    }
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    /// Normalized absolute POSIX path
    pub path: String,
    pub modified: Option<NaiveDateTime>,
    pub size: Option<u64>,
    pub kind: Option<EntryKind>,
}

impl RemoteFile {
    pub fn is_dir(&self) -> bool {
        self.kind == Some(EntryKind::Dir)
    }

    /// Sort key that places entries without a timestamp first
    pub fn modified_or_min(&self) -> NaiveDateTime {
        self.modified.unwrap_or(NaiveDateTime::MIN)
    }

    pub fn is_data_file(&self) -> bool {
        self.name.to_ascii_lowercase().ends_with(DATA_EXTENSION)
    }

    /// Name of the directory holding this entry (empty for `/`)
    pub fn parent_name(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map(|(parent, _)| parent.rsplit('/').next().unwrap_or(""))
            .unwrap_or("")
    }
}

/// A value extracted from one downloaded file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedPoint {
    /// 1-based position of the file in the chronological working set
    pub idx: usize,
    pub value: f64,
    /// Source file name
    pub label: String,
    pub time_iso: String,
    #[serde(skip)]
    pub local_path: PathBuf,
    pub remote_path: String,
}

/// Join path segments into a rooted POSIX path with single separators
pub fn normalize_path<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized = String::from("/");
    for part in parts {
        for segment in part.as_ref().split('/').filter(|s| !s.is_empty()) {
            if !normalized.ends_with('/') {
                normalized.push('/');
            }
            normalized.push_str(segment);
        }
    }
    normalized
}

/// Root directory of one machine, e.g. `/rd/007/ftp`
pub fn machine_root(machine: u32) -> String {
    format!("/rd/{:03}/ftp", machine)
}

/// Parse a `DD-MM-YY` day-folder name
pub fn parse_day(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value, DAY_FORMAT)
}

/// True when a name has the shape `NN-NN-NN`
pub fn looks_like_day_folder(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 8
        && bytes.iter().enumerate().all(|(i, b)| match i {
            2 | 5 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Parse an MLSD/MDTM timestamp, ignoring fractional seconds
pub fn parse_modify(value: &str) -> Option<NaiveDateTime> {
    let whole = value.split('.').next().unwrap_or(value);
    NaiveDateTime::parse_from_str(whole, MODIFY_FORMAT).ok()
}
