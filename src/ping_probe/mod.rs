pub mod probe;
pub mod result;

pub use probe::ping;
pub use result::PingResult;
