use serde::Serialize;

/// Aggregate of one download-throughput run. `duration` is the configured
/// measurement window in seconds; `avg_bps` divides by it even when every
/// stream ended early, so the denominator is stable across runs.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpeedResult {
    pub total_bytes: u64,
    pub duration: f64,
    pub avg_bps: f64,
    pub peak_bps: f64,
}
