//! Progress reporting from download workers to a single consumer

use super::report::AnalysisReport;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

/// Phase of an analysis request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Listing,
    Downloading,
    Extracting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Listing => "listing",
            Stage::Downloading => "downloading",
            Stage::Extracting => "extracting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event streamed by [`super::AnalysisService::spawn_analysis`]
///
/// Zero or more `Progress` events, then exactly one `Done` or `Failed`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnalysisEvent {
    Progress { progress: f64, stage: Stage },
    Done(AnalysisReport),
    #[serde(rename_all = "camelCase")]
    Failed { message: String, client_error: bool },
}

impl AnalysisEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisEvent::Progress { .. })
    }
}

type ProgressFn = Arc<dyn Fn(f64, Stage) + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Silent,
    Callback(ProgressFn),
    Channel(mpsc::Sender<AnalysisEvent>),
}

/// Cheap-to-clone handle workers use to publish progress
///
/// Never blocks: a full channel drops the interim event, a closed one is
/// ignored so a vanished consumer does not stop the batch.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Sink,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::silent()
    }
}

impl ProgressReporter {
    pub fn silent() -> Self {
        Self { sink: Sink::Silent }
    }

    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(f64, Stage) + Send + Sync + 'static,
    {
        Self {
            sink: Sink::Callback(Arc::new(callback)),
        }
    }

    pub fn channel(sender: mpsc::Sender<AnalysisEvent>) -> Self {
        Self {
            sink: Sink::Channel(sender),
        }
    }

    pub fn report(&self, progress: f64, stage: Stage) {
        match &self.sink {
            Sink::Silent => {}
            Sink::Callback(callback) => callback(progress, stage),
            Sink::Channel(sender) => {
                match sender.try_send(AnalysisEvent::Progress { progress, stage }) {
                    Ok(()) | Err(TrySendError::Closed(_)) => {}
                    Err(TrySendError::Full(_)) => {
                        trace!(progress, %stage, "Progress channel full, event dropped");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_callback_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::from_fn(move |p, s| sink.lock().push((p, s)));

        reporter.report(0.05, Stage::Listing);
        reporter.clone().report(0.5, Stage::Downloading);

        assert_eq!(
            *seen.lock(),
            vec![(0.05, Stage::Listing), (0.5, Stage::Downloading)]
        );
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let reporter = ProgressReporter::channel(tx);

        reporter.report(0.1, Stage::Downloading);
        reporter.report(0.2, Stage::Downloading);

        match rx.recv().await {
            Some(AnalysisEvent::Progress { progress, stage }) => {
                assert_eq!(progress, 0.1);
                assert_eq!(stage, Stage::Downloading);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_ignored() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        ProgressReporter::channel(tx).report(0.3, Stage::Extracting);
    }

    #[test]
    fn test_event_serialization() {
        let event = AnalysisEvent::Progress {
            progress: 0.05,
            stage: Stage::Listing,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "listing");

        let failed = AnalysisEvent::Failed {
            message: "Invalid machine 99 (allowed: 1..=50)".to_string(),
            client_error: true,
        };
        assert!(failed.is_terminal());
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["clientError"], true);
    }
}
