//! Descriptive statistics and the heuristics built on them
//!
//! Everything here is pure: callers hand in already-extracted samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TrendDirection;

/// Number of standard deviations above the mean that marks a spike
pub const SPIKE_STD_DEVS: f64 = 2.0;

/// Spike timestamps reported per trend
pub const MAX_SPIKE_TIMES: usize = 10;

/// Relative change below which a trend is stable (percent)
const STABLE_CHANGE_PERCENT: f64 = 10.0;

/// Coefficient of variation above which a series is volatile
const VOLATILE_CV: f64 = 0.5;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Percentile with linear interpolation between the closest ranks
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Summary statistics over one series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub std_dev: f64,
}

impl SeriesStats {
    pub fn compute(values: &[f64]) -> Self {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            mean: mean(values),
            min: if values.is_empty() { 0.0 } else { min },
            max: if values.is_empty() { 0.0 } else { max },
            p50: percentile(values, 50.0),
            p95: percentile(values, 95.0),
            p99: percentile(values, 99.0),
            std_dev: std_dev(values),
        }
    }
}

/// Relative change from `baseline` to `current` in percent
///
/// 0 when both are zero, 100 when only the baseline is zero.
pub fn percent_change(baseline: f64, current: f64) -> f64 {
    if baseline == 0.0 {
        if current == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        (current - baseline) / baseline * 100.0
    }
}

/// Compare the first and last quarter of the series
///
/// Returns the direction and the change percent between the quarter means.
pub fn classify_trend(values: &[f64]) -> (TrendDirection, f64) {
    if values.is_empty() {
        return (TrendDirection::Stable, 0.0);
    }
    let quarter = (values.len() / 4).max(1);
    let first = mean(&values[..quarter]);
    let last = mean(&values[values.len() - quarter..]);
    let change = percent_change(first, last);

    let mut direction = if change.abs() < STABLE_CHANGE_PERCENT {
        TrendDirection::Stable
    } else if change > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    let avg = mean(values);
    let cv = if avg > 0.0 { std_dev(values) / avg } else { 0.0 };
    if cv > VOLATILE_CV {
        direction = TrendDirection::Volatile;
    }

    (direction, change)
}

/// Samples above `mean + 2 * std_dev`
///
/// Returns the total spike count and up to [`MAX_SPIKE_TIMES`] of the most
/// recent spike timestamps in chronological order.
pub fn detect_spikes(samples: &[(DateTime<Utc>, f64)]) -> (usize, Vec<DateTime<Utc>>) {
    let values: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
    let threshold = mean(&values) + SPIKE_STD_DEVS * std_dev(&values);

    let spikes: Vec<DateTime<Utc>> = samples
        .iter()
        .filter(|(_, v)| *v > threshold)
        .map(|(ts, _)| *ts)
        .collect();

    let count = spikes.len();
    let recent = spikes[count.saturating_sub(MAX_SPIKE_TIMES)..].to_vec();
    (count, recent)
}

/// Severity of a restart rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartSeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

pub fn restart_severity(total_restarts: i64, rate_per_hour: f64) -> RestartSeverity {
    if total_restarts == 0 {
        RestartSeverity::None
    } else if rate_per_hour < 0.5 {
        RestartSeverity::Low
    } else if rate_per_hour < 2.0 {
        RestartSeverity::Medium
    } else if rate_per_hour < 6.0 {
        RestartSeverity::High
    } else {
        RestartSeverity::Critical
    }
}

/// Classify restart timing; `times` need not be sorted
///
/// Needs at least four timestamps to say anything.
pub fn detect_restart_pattern(times: &[DateTime<Utc>]) -> Option<String> {
    if times.len() < 4 {
        return None;
    }
    let mut sorted = times.to_vec();
    sorted.sort();

    let intervals: Vec<f64> = sorted
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0)
        .collect();
    let mean_interval = mean(&intervals);
    let std_interval = std_dev(&intervals);

    let first = intervals[0];
    let last = intervals[intervals.len() - 1];

    if std_interval < mean_interval * 0.3 {
        Some(format!(
            "periodic (every ~{:.0} minutes)",
            mean_interval / 60.0
        ))
    } else if last < first * 0.5 {
        Some("escalating".to_string())
    } else {
        Some("random".to_string())
    }
}
