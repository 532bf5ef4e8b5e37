pub mod models;

pub use models::{ProbeFailure, ProbeStatus, Protocol, ProxyConfig, UNKNOWN_COUNTRY};
