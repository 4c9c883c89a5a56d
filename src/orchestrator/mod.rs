pub mod runner;

use std::sync::Arc;

pub use runner::run;

/// Which probe of the battery just finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Ping,
    Tcp,
    Speed,
    Udp,
}

/// Progress notifications emitted while a run is in flight. Decorative by
/// design: observers see per-node and per-probe completion, the orchestration
/// result does not depend on them.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    NodeStarted { index: usize, label: String },
    ProbeFinished { index: usize, probe: ProbeKind },
    NodeFinished { index: usize, reachable: bool },
}

pub type Observer = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
