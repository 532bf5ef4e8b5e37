pub mod classifier;
pub mod decoder;
pub mod dedup;
pub mod emitter;
pub mod fetcher;
pub mod filter;
pub mod geolookup;
pub mod pipeline;
pub mod prober;
pub mod proxy;
pub mod resolver;

pub use classifier::{validate_country, Bucket, Classification};
pub use decoder::{decode, DecodeError};
pub use dedup::dedupe;
pub use pipeline::{Pipeline, PipelineError, RunReport, Summary};
pub use proxy::models::{ProbeFailure, ProbeStatus, Protocol, ProxyConfig};

/// Sends log output of this crate to stderr, prefixed with the module name.
///
/// # Arguments
///
/// * `log_level`: The most verbose level that is printed.
#[cfg(feature = "log")]
pub fn initialize_logging(log_level: log::LevelFilter) -> anyhow::Result<()> {
    stderrlog::new()
        .module(module_path!())
        .show_module_names(true)
        .verbosity(log_level)
        .init()?;
    Ok(())
}
