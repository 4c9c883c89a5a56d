pub mod probe;
pub mod result;

pub use probe::download_throughput;
pub use result::SpeedResult;
