use clap::builder::styling::AnsiColor;
use clap::builder::{PossibleValue, Styles};
use clap::Parser;

fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::BrightGreen.on_default())
        .placeholder(AnsiColor::Cyan.on_default())
}

/// Collects proxy links, keeps the reachable ones and sorts them into
/// subscription files by protocol and country.
#[derive(Parser, Debug, Clone)]
#[command(version, styles=get_styles())]
pub struct Cli {
    /// Subscription URLs to fetch links from.
    #[arg(short, long, num_args(1..), required_unless_present("file"))]
    pub url: Vec<String>,

    /// Local files containing links, one per line.
    #[arg(short, long, num_args(1..))]
    pub file: Vec<std::path::PathBuf>,

    /// Directory the subscription files are written to.
    #[arg(short, long, default_value = "subscriptions")]
    pub output_dir: std::path::PathBuf,

    /// Also write a base64 encoded copy of every file.
    #[arg(long)]
    pub base64: bool,

    /// Write the run summary as JSON to this path.
    #[arg(long)]
    pub report: Option<std::path::PathBuf>,

    /// Log level for application output.
    #[arg(
        long = "log",
        default_value = "off",
        value_parser([
            PossibleValue::new("debug"),
            PossibleValue::new("info"),
            PossibleValue::new("warn"),
            PossibleValue::new("error"),
            PossibleValue::new("trace"),
            PossibleValue::new("off"),
        ])
    )]
    pub log_level: String,

    /// Maximum number of concurrent probes.
    #[arg(
        short,
        long,
        default_value = "50",
        help_heading = "Probe",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub max_connections: u64,

    /// Use the 5 second timeout tier instead of 10 seconds.
    #[arg(long, help_heading = "Probe")]
    pub fast: bool,

    /// Per-probe timeout in seconds; overrides --fast.
    #[arg(long, help_heading = "Probe", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Number of records probed per batch.
    #[arg(
        long,
        default_value = "500",
        help_heading = "Probe",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub batch_size: u64,

    /// Only connect, skip the TLS handshake.
    #[arg(long, help_heading = "Probe")]
    pub no_tls: bool,

    /// Probe records the smart filter would otherwise drop.
    #[arg(long, help_heading = "Filter")]
    pub no_smart_filter: bool,

    /// Maximum links kept per protocol file.
    #[arg(long, default_value = "1000", help_heading = "Classify")]
    pub max_per_protocol: usize,

    /// Maximum links kept per country file.
    #[arg(long, default_value = "1000", help_heading = "Classify")]
    pub max_per_country: usize,

    /// Resolve countries of IP addresses with the GeoLite2 database (downloaded on first use).
    #[arg(long, help_heading = "Classify")]
    pub geo_lookup: bool,
}
