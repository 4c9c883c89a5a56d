use serde::Serialize;

use crate::stats::LatencySummary;

/// Outcome of a cadenced UDP send/echo run. `pps` divides sent packets by the
/// configured duration. Without echo replies the loss percentage reads 100
/// even when every send succeeded; only replies count as received.
#[derive(Debug, Clone, Serialize)]
pub struct UdpResult {
    pub sent: u32,
    pub received: u32,
    pub loss_percent: f64,
    pub rtts: Vec<f64>,
    pub pps: f64,
    #[serde(flatten)]
    pub stats: Option<LatencySummary>,
}

impl UdpResult {
    /// Nothing was sent: socket could not be opened or target never resolved.
    pub fn unavailable() -> Self {
        Self {
            sent: 0,
            received: 0,
            loss_percent: 100.0,
            rtts: Vec::new(),
            pps: 0.0,
            stats: None,
        }
    }
}
