use serde::Serialize;

/// Aggregates computed over a non-empty set of latency samples, in
/// milliseconds. Absent entirely when no sample was collected, so a missing
/// measurement is never confused with a measured zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Linearly-interpolated percentile at rank `(n - 1) * p / 100`, using the two
/// bounding order statistics. Returns `None` on an empty sample set. The input
/// does not have to be sorted.
pub fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (sorted.len() - 1) as f64 * (p / 100.0);
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    if lower == upper {
        return Some(sorted[lower]);
    }
    let weight = rank - lower as f64;
    Some(sorted[lower] * (1.0 - weight) + sorted[upper] * weight)
}

/// Summarizes a sample set, or `None` when it is empty.
pub fn summarize(samples: &[f64]) -> Option<LatencySummary> {
    if samples.is_empty() {
        return None;
    }
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = samples.iter().sum::<f64>() / samples.len() as f64;
    Some(LatencySummary {
        min,
        avg,
        max,
        p50: percentile(samples, 50.0)?,
        p95: percentile(samples, 95.0)?,
        p99: percentile(samples, 99.0)?,
    })
}

/// Loss percentage in `[0, 100]`. Defined as 100 when nothing was sent.
pub fn loss_percent(sent: u32, received: u32) -> f64 {
    if sent == 0 {
        return 100.0;
    }
    (1.0 - received as f64 / sent as f64) * 100.0
}
