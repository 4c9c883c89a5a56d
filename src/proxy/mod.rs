pub mod manager;

pub use manager::{ProxyHandle, start};
