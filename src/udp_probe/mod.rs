pub mod probe;
pub mod result;

pub use probe::udp_simulate;
pub use result::UdpResult;
