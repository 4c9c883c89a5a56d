use serde::Serialize;

use crate::stats::LatencySummary;

/// Outcome of one ICMP probe. A failed or impossible invocation is still a
/// result: full loss and no samples.
#[derive(Debug, Clone, Serialize)]
pub struct PingResult {
    pub sent: u32,
    pub received: u32,
    pub loss_percent: f64,
    pub rtts: Vec<f64>,
    #[serde(flatten)]
    pub stats: Option<LatencySummary>,
}

impl PingResult {
    /// The utility could not be invoked or timed out.
    pub fn unreachable(sent: u32) -> Self {
        Self {
            sent,
            received: 0,
            loss_percent: 100.0,
            rtts: Vec::new(),
            stats: None,
        }
    }
}
