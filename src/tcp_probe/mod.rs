pub mod probe;
pub mod result;

pub use probe::repeated_connect;
pub use result::TcpResult;
