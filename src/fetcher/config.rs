/// Options for collecting raw links from sources.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of sources fetched at once.
    pub concurrency_limit: usize,
    /// Timeout for a single source in milliseconds.
    pub request_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency_limit: 10,
            request_timeout: 30000,
        }
    }
}
