//! Cheap heuristic gate run before probing, so the probe budget is spent on
//! records that have a chance of being real public proxies.

mod config;

use std::fmt::Display;

pub use config::Config;

use crate::proxy::models::ProxyConfig;

/// Why the smart filter dropped a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    PrivateAddress,
    DeniedPort,
    PortOutOfRange,
    WeakIdentity,
}

impl Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrivateAddress => write!(f, "private or loopback address"),
            Self::DeniedPort => write!(f, "well-known service port"),
            Self::PortOutOfRange => write!(f, "port outside accepted range"),
            Self::WeakIdentity => write!(f, "identity missing or too short"),
        }
    }
}

/// Applies the smart filter rules to records.
#[derive(Debug, Clone, Default)]
pub struct SmartFilter {
    config: Config,
}

impl SmartFilter {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Checks a single record against every rule.
    ///
    /// # Arguments
    ///
    /// * `proxy`: The record to check.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the record should be probed, otherwise the first rule it broke.
    pub fn check(&self, proxy: &ProxyConfig) -> Result<(), Rejection> {
        if self
            .config
            .private_prefixes
            .iter()
            .any(|prefix| proxy.address.starts_with(prefix.as_str()))
        {
            return Err(Rejection::PrivateAddress);
        }
        if self.config.denied_ports.contains(&proxy.port) {
            return Err(Rejection::DeniedPort);
        }
        if proxy.port < self.config.min_port || proxy.port >= self.config.max_port {
            return Err(Rejection::PortOutOfRange);
        }
        if proxy.identity.trim().chars().count() < self.config.min_identity_len {
            return Err(Rejection::WeakIdentity);
        }
        Ok(())
    }

    /// Keeps the records that pass [`SmartFilter::check`]; a disabled filter keeps everything.
    pub fn filter(&self, proxies: Vec<ProxyConfig>) -> Vec<ProxyConfig> {
        if !self.config.enabled {
            return proxies;
        }

        let before = proxies.len();
        let kept: Vec<ProxyConfig> = proxies
            .into_iter()
            .filter(|proxy| match self.check(proxy) {
                Ok(()) => true,
                Err(_reason) => {
                    #[cfg(feature = "log")]
                    log::trace!("{}: filtered out, {}", proxy.endpoint(), _reason);
                    false
                }
            })
            .collect();

        #[cfg(feature = "log")]
        log::debug!(
            "Smart filter kept {} of {} records",
            kept.len(),
            before
        );
        #[cfg(not(feature = "log"))]
        let _ = before;
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;

    fn trojan(host: &str, port: u16, password: &str) -> ProxyConfig {
        decode(&format!("trojan://{}@{}:{}", password, host, port)).unwrap()
    }

    #[test]
    fn accepts_public_endpoint_with_strong_identity() {
        let filter = SmartFilter::default();
        assert_eq!(filter.check(&trojan("8.8.4.4", 2053, "0123456789")), Ok(()));
        assert_eq!(filter.check(&trojan("proxy.example.com", 65534, "long-enough-password")), Ok(()));
    }

    #[test]
    fn rejects_private_ranges() {
        let filter = SmartFilter::default();
        for host in ["127.0.0.1", "10.1.2.3", "172.20.0.1", "192.168.1.1"] {
            assert_eq!(
                filter.check(&trojan(host, 2053, "0123456789")),
                Err(Rejection::PrivateAddress)
            );
        }
    }

    #[test]
    fn rejects_service_and_out_of_range_ports() {
        let filter = SmartFilter::default();
        assert_eq!(filter.check(&trojan("8.8.4.4", 3389, "0123456789")), Err(Rejection::DeniedPort));
        assert_eq!(filter.check(&trojan("8.8.4.4", 80, "0123456789")), Err(Rejection::DeniedPort));
        assert_eq!(filter.check(&trojan("8.8.4.4", 443, "0123456789")), Err(Rejection::PortOutOfRange));
        assert_eq!(filter.check(&trojan("8.8.4.4", 65535, "0123456789")), Err(Rejection::PortOutOfRange));
    }

    #[test]
    fn rejects_short_identity() {
        let filter = SmartFilter::default();
        assert_eq!(filter.check(&trojan("8.8.4.4", 2053, "short")), Err(Rejection::WeakIdentity));
    }

    #[test]
    fn disabled_filter_keeps_everything() {
        let filter = SmartFilter::new(Config {
            enabled: false,
            ..Default::default()
        });
        let kept = filter.filter(vec![trojan("127.0.0.1", 22, "x")]);
        assert_eq!(kept.len(), 1);

        let kept = SmartFilter::default().filter(vec![
            trojan("127.0.0.1", 22, "x"),
            trojan("8.8.4.4", 2053, "0123456789"),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].address, "8.8.4.4");
    }
}
