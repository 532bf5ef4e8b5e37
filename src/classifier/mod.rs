//! Groups reachable records by protocol and by country, fastest first.

mod config;
mod country;

use std::{collections::BTreeMap, fmt::Display, sync::Arc};

pub use config::Config;
pub use country::{infer_country, validate_country};
use hashbrown::HashMap;

use crate::{
    geolookup::GeoLookup,
    proxy::models::{Protocol, ProxyConfig, UNKNOWN_COUNTRY},
};

/// Name of an output group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Protocol(Protocol),
    Country(String),
    /// Every reachable record regardless of protocol.
    All,
}

impl Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Protocol(protocol) => write!(f, "{}", protocol),
            Self::Country(code) => f.write_str(code),
            Self::All => f.write_str("all"),
        }
    }
}

/// Sort key that places unmeasured records after every measured one.
fn latency_key(proxy: &ProxyConfig) -> f64 {
    match proxy.latency_ms() {
        latency if latency > 0.0 => latency,
        _ => f64::INFINITY,
    }
}

/// Stable ascending sort by latency; records without a latency go last.
pub fn sort_by_latency(proxies: &mut [ProxyConfig]) {
    proxies.sort_by(|a, b| latency_key(a).total_cmp(&latency_key(b)));
}

/// Reachable records grouped for emission.
#[derive(Debug, Default, Clone)]
pub struct Classification {
    pub by_protocol: BTreeMap<Protocol, Vec<ProxyConfig>>,
    /// Country groups, including [`UNKNOWN_COUNTRY`].
    pub by_country: BTreeMap<String, Vec<ProxyConfig>>,
    /// All reachable records, fastest first.
    pub combined: Vec<ProxyConfig>,
    /// Records cut from protocol buckets by the capacity limit.
    pub dropped: usize,
}

impl Classification {
    /// Raw links per bucket, leaving out empty buckets and the unknown country.
    pub fn buckets(&self) -> HashMap<Bucket, Vec<String>> {
        let raws = |proxies: &[ProxyConfig]| -> Vec<String> {
            proxies.iter().map(|proxy| proxy.raw.clone()).collect()
        };

        let mut buckets = HashMap::new();
        for (protocol, proxies) in &self.by_protocol {
            if !proxies.is_empty() {
                buckets.insert(Bucket::Protocol(*protocol), raws(proxies));
            }
        }
        for (country, proxies) in &self.by_country {
            if !proxies.is_empty() && country != UNKNOWN_COUNTRY {
                buckets.insert(Bucket::Country(country.clone()), raws(proxies));
            }
        }
        if !self.combined.is_empty() {
            buckets.insert(Bucket::All, raws(&self.combined));
        }
        buckets
    }

    /// Number of reachable records that were classified.
    pub fn len(&self) -> usize {
        self.combined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
    }
}

/// Assigns countries and builds the capacity-limited buckets.
#[derive(Default)]
pub struct Classifier {
    config: Config,
    geolookup: Option<Arc<GeoLookup>>,
}

impl Classifier {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            geolookup: None,
        }
    }

    /// Uses `geolookup` as the last resort for records with a literal IP address.
    pub fn with_geolookup(mut self, geolookup: Arc<GeoLookup>) -> Self {
        self.geolookup = Some(geolookup);
        self
    }

    fn truncate(bucket: &mut Vec<ProxyConfig>, max: usize, _name: &dyn Display) -> usize {
        if bucket.len() <= max {
            return 0;
        }
        let dropped = bucket.len() - max;
        bucket.truncate(max);

        #[cfg(feature = "log")]
        log::debug!(
            "{}: kept the {} fastest, dropped {}",
            _name,
            max,
            dropped
        );
        dropped
    }

    /// Classifies the reachable records among `proxies`.
    ///
    /// Unreachable records are ignored. Each reachable record gets its
    /// country inferred, then buckets are filled in latency order and cut to
    /// their configured capacity.
    pub fn classify(&self, proxies: Vec<ProxyConfig>) -> Classification {
        let mut reachable: Vec<ProxyConfig> = proxies
            .into_iter()
            .filter(ProxyConfig::is_reachable)
            .map(|mut proxy| {
                proxy.country = infer_country(
                    &proxy,
                    self.config.infer_from_domain,
                    self.geolookup.as_deref(),
                );
                proxy
            })
            .collect();
        sort_by_latency(&mut reachable);

        let mut classification = Classification::default();
        for proxy in &reachable {
            classification
                .by_protocol
                .entry(proxy.protocol)
                .or_default()
                .push(proxy.clone());
            classification
                .by_country
                .entry(proxy.country.clone())
                .or_default()
                .push(proxy.clone());
        }

        for (protocol, bucket) in classification.by_protocol.iter_mut() {
            classification.dropped +=
                Self::truncate(bucket, self.config.max_per_protocol, protocol);
        }
        for (country, bucket) in classification.by_country.iter_mut() {
            Self::truncate(bucket, self.config.max_per_country, country);
        }
        if let Some(max) = self.config.max_combined {
            Self::truncate(&mut reachable, max, &Bucket::All);
        }
        classification.combined = reachable;

        #[cfg(feature = "log")]
        log::debug!(
            "Classified {} records into {} protocol and {} country buckets",
            classification.combined.len(),
            classification.by_protocol.len(),
            classification.by_country.len()
        );
        classification
    }
}
