//! Analysis orchestration: discovery, selection, batch download and reporting

pub mod progress;
pub mod report;
pub mod service;

pub use progress::{AnalysisEvent, ProgressReporter, Stage};
pub use report::{
    AnalysisMode, AnalysisOutcome, AnalysisReport, AnalysisRequest, FileFailure, FtpStatus,
    LatestFile, ReportPoint, Selection,
};
pub use service::{AnalysisService, EVENT_CHANNEL_CAPACITY};
