//! Machine utilization estimate from file sizes and timestamps
//!
//! Each file stands for one processing cycle whose duration is approximated
//! from its size. A robust cycle length and change-over gap are derived from
//! the whole sequence, then each file and each short gap contributes
//! productive hours. Result is the productive share of the elapsed window.

use crate::models::RemoteFile;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use serde::Serialize;

const BYTES_PER_HOUR: f64 = 1024.0 * 1024.0;
const MIN_CYCLE_HOURS: f64 = 0.1;
const UNKNOWN_SIZE_HOURS: f64 = 1.0;
const TRIM_FRACTION: f64 = 0.05;
const LOWER_GAP_FRACTION: f64 = 0.7;
const MAX_TOLERANCE: f64 = 0.3;
const MIN_ERROR_TIMEOUT_HOURS: f64 = 20.0 / 60.0;
const MIN_TOTAL_HOURS: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RuntimeEstimate {
    /// Productive share of elapsed time, in `[0, 100]`
    pub percent: f64,
}

/// Cycle model parameters derived from a file sequence, in hours
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleModel {
    pub t_cycle: f64,
    pub t_change: f64,
    pub tolerance: f64,
    pub error_timeout: f64,
}

impl CycleModel {
    fn cycle_ceiling(&self) -> f64 {
        (self.t_cycle + self.t_change) * (1.0 + self.tolerance)
    }

    fn gap_ceiling(&self) -> f64 {
        self.t_change * (1.0 + self.tolerance)
    }

    /// Productive hours credited for one file of duration `d`
    fn productive(&self, d: f64) -> f64 {
        let ceiling = self.cycle_ceiling();
        if d <= ceiling {
            d
        } else if d <= self.error_timeout {
            ceiling
        } else {
            d.min(self.t_cycle)
        }
    }
}

/// Median of a sorted slice, averaging the two middle values for even lengths
fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    median_sorted(&sorted)
}

fn hours_between(later: NaiveDateTime, earlier: NaiveDateTime) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 3_600_000.0
}

/// Duration proxy for one file, in hours
fn file_duration(file: &RemoteFile) -> f64 {
    match file.size {
        Some(size) if size > 0 => (size as f64 / BYTES_PER_HOUR).max(MIN_CYCLE_HOURS),
        _ => UNKNOWN_SIZE_HOURS,
    }
}

/// Gap since the previous timestamped file, per file (`None` for the first or untimed)
fn file_gaps(files: &[RemoteFile]) -> Vec<Option<f64>> {
    let mut last: Option<NaiveDateTime> = None;
    files
        .iter()
        .map(|file| {
            let gap = match (file.modified, last) {
                (Some(current), Some(previous)) => Some(hours_between(current, previous)),
                _ => None,
            };
            if file.modified.is_some() {
                last = file.modified;
            }
            gap
        })
        .collect()
}

/// Fit the cycle model to per-file durations and positive gaps
pub fn fit_cycle_model(durations: &[f64], positive_gaps: &[f64]) -> CycleModel {
    let mut sorted = durations.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let trim = (TRIM_FRACTION * n as f64) as usize;
    let trimmed: &[f64] = if n > 2 * trim { &sorted[trim..n - trim] } else { &[] };
    let core = if trimmed.is_empty() { &sorted[..] } else { trimmed };
    let t_cycle = median_sorted(core);

    let mut gaps = positive_gaps.to_vec();
    gaps.sort_by(f64::total_cmp);
    let t_change = if gaps.is_empty() {
        t_cycle
    } else {
        let keep = ((gaps.len() as f64 * LOWER_GAP_FRACTION) as usize).max(1);
        median_sorted(&gaps[..keep])
    };

    let deviations: Vec<f64> = core.iter().map(|d| (d - t_cycle).abs()).collect();
    let mad = median(&deviations);
    let tolerance = if t_cycle > 0.0 {
        (mad / t_cycle).min(MAX_TOLERANCE)
    } else {
        MAX_TOLERANCE
    };

    CycleModel {
        t_cycle,
        t_change,
        tolerance,
        error_timeout: (3.0 * t_cycle).max(MIN_ERROR_TIMEOUT_HOURS),
    }
}

/// Estimate the productive share of `total_hours` covered by `files`
///
/// `files` must be in chronological order. Returns 0 for an empty sequence or
/// a non-positive window.
pub fn estimate_machine_runtime(files: &[RemoteFile], total_hours: f64) -> RuntimeEstimate {
    if files.is_empty() || total_hours.is_nan() || total_hours <= 0.0 {
        return RuntimeEstimate { percent: 0.0 };
    }

    let durations: Vec<f64> = files.iter().map(file_duration).collect();
    let gaps = file_gaps(files);
    let positive: Vec<f64> = gaps.iter().flatten().copied().filter(|g| *g > 0.0).collect();
    let model = fit_cycle_model(&durations, &positive);

    let productive: f64 = durations
        .iter()
        .zip(&gaps)
        .map(|(&d, gap)| {
            let idle = match gap {
                Some(g) if *g > 0.0 && *g <= model.gap_ceiling() => *g,
                _ => 0.0,
            };
            model.productive(d) + idle
        })
        .sum();

    RuntimeEstimate {
        percent: (productive / total_hours * 100.0).clamp(0.0, 100.0),
    }
}

/// Elapsed hours for an inclusive day range: `(end + 1 day) - start`
pub fn range_total_hours(start: NaiveDate, end: NaiveDate) -> f64 {
    let hours = hours_between(
        (end + ChronoDuration::days(1)).and_time(chrono::NaiveTime::MIN),
        start.and_time(chrono::NaiveTime::MIN),
    );
    hours.max(MIN_TOTAL_HOURS)
}

/// Elapsed hours spanned by a file set
///
/// From the earliest timestamp to one minute past the latest. Without any
/// timestamp, one hour per file.
pub fn span_total_hours(files: &[RemoteFile]) -> f64 {
    let stamps = files.iter().filter_map(|f| f.modified);
    let bounds = stamps.fold(None, |acc: Option<(NaiveDateTime, NaiveDateTime)>, ts| {
        Some(match acc {
            None => (ts, ts),
            Some((lo, hi)) => (lo.min(ts), hi.max(ts)),
        })
    });

    let hours = match bounds {
        Some((first, last)) => hours_between(last + ChronoDuration::minutes(1), first),
        None => files.len().max(1) as f64,
    };
    hours.max(MIN_TOTAL_HOURS)
}
