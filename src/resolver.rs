use std::{net::IpAddr, time::Duration};

use cached::proc_macro::cached;
use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    system_conf::read_system_conf,
    TokioAsyncResolver,
};

use crate::proxy::models::ProbeFailure;

/// Async DNS resolver shared by all probe workers.
#[derive(Clone)]
pub struct Resolver {
    inner: TokioAsyncResolver,
}

impl Resolver {
    /// Builds a resolver from the system configuration, falling back to public
    /// resolvers when none can be read.
    ///
    /// # Arguments
    ///
    /// * `timeout`: Upper bound for a single DNS query.
    pub fn new(timeout: Duration) -> Self {
        let (config, mut opts) = read_system_conf()
            .unwrap_or_else(|_| (ResolverConfig::default(), ResolverOpts::default()));
        opts.timeout = timeout;
        opts.attempts = 1;
        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }

    /// Resolves `host` to one address. Literal IPs are returned untouched.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, ProbeFailure> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        lookup(&self.inner, host).await
    }
}

#[cached(
    size = 8192,
    time = 600,
    result = true,
    key = "String",
    convert = r#"{ host.to_ascii_lowercase() }"#
)]
async fn lookup(resolver: &TokioAsyncResolver, host: &str) -> Result<IpAddr, ProbeFailure> {
    let started = tokio::time::Instant::now();
    let answer = resolver
        .lookup_ip(host)
        .await
        .map_err(|e| ProbeFailure::Resolve(e.to_string()))?;
    let ip = answer
        .iter()
        .next()
        .ok_or_else(|| ProbeFailure::Resolve(format!("no address records for {}", host)))?;

    #[cfg(feature = "log")]
    log::trace!("{} resolved to {} in {:?}", host, ip, started.elapsed());
    #[cfg(not(feature = "log"))]
    let _ = started;
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_addresses_skip_dns() {
        let resolver = Resolver::new(Duration::from_secs(1));
        assert_eq!(
            resolver.resolve("203.0.113.9").await,
            Ok("203.0.113.9".parse().unwrap())
        );
        assert_eq!(
            resolver.resolve("2001:db8::1").await,
            Ok("2001:db8::1".parse().unwrap())
        );
    }
}
