use std::{fmt::Display, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use native_tls::TlsConnector;
use tokio::{
    net::TcpStream,
    time::{self, timeout},
};

use super::config::Config;
use crate::{
    proxy::models::{ProbeFailure, ProxyConfig},
    resolver::Resolver,
};

/// Measures whether a record's endpoint is reachable.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probes one record.
    ///
    /// # Returns
    ///
    /// The connect latency on success, or the reason the endpoint is unreachable.
    async fn probe(&self, proxy: &ProxyConfig) -> Result<Duration, ProbeFailure>;
}

/// Reachability check by TCP connect, followed by a TLS handshake for records
/// that declare TLS.
pub struct TcpProber {
    resolver: Resolver,
    timeout: Duration,
    tls_probe: bool,
    strict: tokio_native_tls::TlsConnector,
    relaxed: tokio_native_tls::TlsConnector,
}

impl TcpProber {
    /// Creates a new instance of `TcpProber`.
    ///
    /// # Arguments
    ///
    /// * `config`: Probe options; only the timeout and TLS switch are used here.
    ///
    /// # Returns
    ///
    /// The prober, or an error if the TLS backend cannot be initialised.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let strict = TlsConnector::builder().build()?;
        let relaxed = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;

        Ok(Self {
            resolver: Resolver::new(config.timeout()),
            timeout: config.timeout(),
            tls_probe: config.tls_probe,
            strict: strict.into(),
            relaxed: relaxed.into(),
        })
    }

    /// Dials the endpoint once and, for TLS records, completes a handshake.
    ///
    /// The latency runs from `start_time` to the end of the handshake.
    async fn attempt(
        &self,
        proxy: &ProxyConfig,
        addr: SocketAddr,
        connector: &tokio_native_tls::TlsConnector,
        start_time: time::Instant,
    ) -> Result<Duration, ProbeFailure> {
        self.log_trace(proxy, "Starting TCP connection");

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ProbeFailure::Connect(e.to_string()))?;
        self.log_trace(proxy, format!("Connected in {:?}", start_time.elapsed()));

        if self.tls_probe && proxy.tls {
            connector
                .connect(proxy.server_name(), stream)
                .await
                .map_err(|e| ProbeFailure::Tls(e.to_string()))?;
            self.log_trace(proxy, "TLS connection established successfully");
        }
        Ok(start_time.elapsed())
    }

    async fn run(&self, proxy: &ProxyConfig) -> Result<Duration, ProbeFailure> {
        let ip = self.resolver.resolve(&proxy.address).await?;
        let addr = SocketAddr::new(ip, proxy.port);

        // a relaxed retry still counts from the first dial
        let start_time = time::Instant::now();
        match self.attempt(proxy, addr, &self.strict, start_time).await {
            // self-signed certificates are common on proxy servers
            Err(ProbeFailure::Tls(reason)) => {
                self.log_trace(proxy, format!("Retrying without verification: {}", reason));
                self.attempt(proxy, addr, &self.relaxed, start_time).await
            }
            outcome => outcome,
        }
    }

    fn log_trace<S>(&self, _proxy: &ProxyConfig, _msg: S)
    where
        S: Display,
    {
        #[cfg(feature = "log")]
        log::trace!("{}: {}", _proxy.endpoint(), _msg);
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, proxy: &ProxyConfig) -> Result<Duration, ProbeFailure> {
        match timeout(self.timeout, self.run(proxy)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeFailure::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    use super::*;
    use crate::decoder::decode;

    fn prober(timeout: Duration) -> TcpProber {
        TcpProber::new(&Config {
            timeout: Some(timeout),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn open_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let proxy = decode(&format!("vless://abcdefghijkl@127.0.0.1:{}", port)).unwrap();

        let latency = prober(Duration::from_secs(2)).probe(&proxy).await.unwrap();
        assert!(latency < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn closed_port_fails_within_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let proxy = decode(&format!("vless://abcdefghijkl@127.0.0.1:{}", port)).unwrap();

        let started = time::Instant::now();
        let outcome = prober(Duration::from_secs(2)).probe(&proxy).await;
        assert!(outcome.is_err());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn tls_failure_on_plain_listener_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // accept and hang up without speaking TLS
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });
        let proxy = decode(&format!("trojan://abcdefghijkl@127.0.0.1:{}", port)).unwrap();

        let outcome = prober(Duration::from_secs(2)).probe(&proxy).await;
        assert!(matches!(outcome, Err(ProbeFailure::Tls(_))));
    }

    /// Serves TLS on a local port with a freshly generated self-signed certificate.
    async fn self_signed_listener() -> u16 {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let identity = native_tls::Identity::from_pkcs8(
            cert.serialize_pem().unwrap().as_bytes(),
            cert.serialize_private_key_pem().as_bytes(),
        )
        .unwrap();
        let acceptor = tokio_native_tls::TlsAcceptor::from(
            native_tls::TlsAcceptor::new(identity).unwrap(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Ok(mut stream) = acceptor.accept(stream).await {
                        let _ = stream.shutdown().await;
                    }
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn self_signed_certificate_passes_on_relaxed_retry() {
        let port = self_signed_listener().await;
        let proxy = decode(&format!("trojan://abcdefghijkl@127.0.0.1:{}", port)).unwrap();
        let prober = prober(Duration::from_secs(5));
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let strict = prober
            .attempt(&proxy, addr, &prober.strict, time::Instant::now())
            .await;
        assert!(matches!(strict, Err(ProbeFailure::Tls(_))));

        let latency = prober.probe(&proxy).await.unwrap();
        assert!(latency < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn retry_latency_counts_from_first_dial() {
        let port = self_signed_listener().await;
        let proxy = decode(&format!("trojan://abcdefghijkl@127.0.0.1:{}", port)).unwrap();
        let prober = prober(Duration::from_secs(5));
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let start_time = time::Instant::now();
        time::sleep(Duration::from_millis(50)).await;
        let latency = prober
            .attempt(&proxy, addr, &prober.relaxed, start_time)
            .await
            .unwrap();
        assert!(latency >= Duration::from_millis(50));
    }
}
