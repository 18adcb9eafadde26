//! Seven-day trailing mean of scale weight ("trend weight").

use chrono::Datelike;
use tracing::debug;

use crate::error::Result;
use crate::models::{WeightLog, parse_iso_day};
use crate::store::WeightLogStore;

/// Days before the current one that still count toward its trend.
pub const TREND_WINDOW_DAYS: i64 = 6;

/// Calendar day as an integer, so window arithmetic never touches wall-clock time.
#[must_use]
pub fn day_index(date: &str) -> Option<i64> {
    parse_iso_day(date).map(|d| i64::from(d.num_days_from_ce()))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Trend for every log with a well-formed date, keyed by log id.
///
/// Rows are ordered by their ISO date string. Each row's trend is the mean
/// `scale_weight` of all rows dated within `[date - 6, date]`, rounded to
/// three decimals. Rows with malformed dates are left out of both the
/// averages and the result.
#[must_use]
pub fn compute_trends(logs: &[WeightLog]) -> Vec<(i64, Option<f64>)> {
    let mut series: Vec<(&WeightLog, i64)> = logs
        .iter()
        .filter_map(|log| day_index(&log.date).map(|idx| (log, idx)))
        .collect();
    series.sort_by(|a, b| a.0.date.cmp(&b.0.date));

    let days: Vec<i64> = series.iter().map(|(_, idx)| *idx).collect();
    series
        .iter()
        .map(|(log, day)| {
            let lo = days.partition_point(|&d| d < day - TREND_WINDOW_DAYS);
            let hi = days.partition_point(|&d| d <= *day);
            let window = &series[lo..hi];
            let trend = if window.is_empty() {
                None
            } else {
                let sum: f64 = window.iter().map(|(l, _)| l.scale_weight).sum();
                #[allow(clippy::cast_precision_loss)]
                let mean = sum / window.len() as f64;
                Some(round3(mean))
            };
            (log.id, trend)
        })
        .collect()
}

fn same_trend(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => (x - y).abs() < 1e-9,
        (None, None) => true,
        _ => false,
    }
}

/// Recompute and store trend weights for one person inside the caller's
/// transaction. Only rows whose trend changed are rewritten; returns how many.
pub fn recompute_for_person(store: &WeightLogStore<'_>, person_id: &str) -> Result<usize> {
    let logs = store.for_person(person_id)?;
    let mut rewritten = 0;
    for (id, trend) in compute_trends(&logs) {
        let current = logs.iter().find(|l| l.id == id).and_then(|l| l.trend_weight);
        if !same_trend(current, trend) {
            store.set_trend(id, trend)?;
            rewritten += 1;
        }
    }
    debug!(person_id, logs = logs.len(), rewritten, "Recomputed trend weights");
    Ok(rewritten)
}
