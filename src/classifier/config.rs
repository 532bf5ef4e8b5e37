/// Options for grouping and ranking reachable records.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum records kept per protocol bucket.
    pub max_per_protocol: usize,
    /// Maximum records kept per country bucket.
    pub max_per_country: usize,
    /// Maximum records kept in the combined bucket; unlimited when `None`.
    pub max_combined: Option<usize>,
    /// Use the ccTLD of hostname addresses when nothing better is known.
    pub infer_from_domain: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_per_protocol: 1000,
            max_per_country: 1000,
            max_combined: None,
            infer_from_domain: true,
        }
    }
}
