use std::time::Duration;

/// Timeout tier used for a probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMode {
    /// 10 second budget per record.
    #[default]
    Normal,
    /// 5 second budget per record.
    Fast,
}

impl ProbeMode {
    pub fn timeout(&self) -> Duration {
        match self {
            Self::Normal => Duration::from_secs(10),
            Self::Fast => Duration::from_secs(5),
        }
    }
}

/// Options for configuring the probing process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of probes in flight at once.
    pub concurrency_limit: usize,
    /// Timeout tier.
    pub mode: ProbeMode,
    /// Explicit per-record timeout; overrides `mode` when set.
    pub timeout: Option<Duration>,
    /// Number of records handed to the worker pool at a time.
    pub batch_size: usize,
    /// Pause between batches so ephemeral ports can be recycled.
    pub batch_pause: Duration,
    /// Follow the TCP connect with a TLS handshake for TLS records.
    pub tls_probe: bool,
}

impl Config {
    /// Effective per-record timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(|| self.mode.timeout())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency_limit: 50,
            mode: ProbeMode::Normal,
            timeout: None,
            batch_size: 500,
            batch_pause: Duration::from_millis(250),
            tls_probe: true,
        }
    }
}
