use serde::Serialize;

use crate::stats::LatencySummary;

/// Outcome of a repeated TCP-connect probe. Failed attempts count toward
/// loss but contribute no latency sample.
#[derive(Debug, Clone, Serialize)]
pub struct TcpResult {
    pub attempts: u32,
    pub successes: u32,
    pub loss_percent: f64,
    pub rtts: Vec<f64>,
    #[serde(flatten)]
    pub stats: Option<LatencySummary>,
}

impl TcpResult {
    /// At least one connection attempt succeeded.
    pub fn reachable(&self) -> bool {
        self.successes > 0
    }
}
