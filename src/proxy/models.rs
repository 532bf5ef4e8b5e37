use std::{borrow::Cow, fmt::Display, str::FromStr, time::Duration};

use serde::Serialize;

/// Country label used whenever no trustworthy country could be derived.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Proxy protocols understood by the decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    #[serde(rename = "ss")]
    Shadowsocks,
    #[serde(rename = "ssr")]
    ShadowsocksR,
    Hysteria,
    Hysteria2,
    #[serde(rename = "wireguard")]
    WireGuard,
    Tuic,
    Naive,
}

impl Protocol {
    /// Every protocol, in bucket emission order.
    pub const ALL: [Protocol; 10] = [
        Protocol::Vmess,
        Protocol::Vless,
        Protocol::Trojan,
        Protocol::Shadowsocks,
        Protocol::ShadowsocksR,
        Protocol::Hysteria,
        Protocol::Hysteria2,
        Protocol::WireGuard,
        Protocol::Tuic,
        Protocol::Naive,
    ];

    /// Canonical short tag, also used as the protocol bucket name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vmess => "vmess",
            Self::Vless => "vless",
            Self::Trojan => "trojan",
            Self::Shadowsocks => "ss",
            Self::ShadowsocksR => "ssr",
            Self::Hysteria => "hysteria",
            Self::Hysteria2 => "hysteria2",
            Self::WireGuard => "wireguard",
            Self::Tuic => "tuic",
            Self::Naive => "naive",
        }
    }

    /// Whether the protocol always runs over TLS regardless of the link's own flags.
    pub fn implies_tls(&self) -> bool {
        matches!(self, Self::Trojan)
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    /// Parses a protocol tag, folding the aliases seen in subscription feeds
    /// and SingBox outbounds (`shadowsocks`, `hy2`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vmess" => Ok(Self::Vmess),
            "vless" => Ok(Self::Vless),
            "trojan" => Ok(Self::Trojan),
            "ss" | "shadowsocks" => Ok(Self::Shadowsocks),
            "ssr" | "shadowsocksr" => Ok(Self::ShadowsocksR),
            "hysteria" => Ok(Self::Hysteria),
            "hysteria2" | "hy2" => Ok(Self::Hysteria2),
            "wireguard" | "wg" => Ok(Self::WireGuard),
            "tuic" => Ok(Self::Tuic),
            "naive" => Ok(Self::Naive),
            other => Err(format!("unknown protocol: {}", other)),
        }
    }
}

/// Why a reachability probe failed.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    #[error("timed out")]
    Timeout,
    #[error("failed to resolve host: {0}")]
    Resolve(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("tls handshake failed: {0}")]
    Tls(String),
}

/// Result of the probe phase for a single record.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProbeStatus {
    /// The record has not been probed yet.
    #[default]
    Untested,
    /// A connection (and TLS handshake, when attempted) succeeded.
    Reachable { latency_ms: f64 },
    /// The probe failed; the failure is final for this run.
    Unreachable { reason: ProbeFailure },
}

impl From<Result<Duration, ProbeFailure>> for ProbeStatus {
    fn from(result: Result<Duration, ProbeFailure>) -> Self {
        match result {
            Ok(latency) => Self::Reachable {
                latency_ms: latency.as_secs_f64() * 1000.0,
            },
            Err(reason) => Self::Unreachable { reason },
        }
    }
}

/// Normalized description of one proxy endpoint, produced by a decoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyConfig {
    /// Protocol the link was written for.
    pub protocol: Protocol,
    /// Hostname or literal IP address of the server.
    pub address: String,
    /// Server port, always non-zero.
    pub port: u16,
    /// Protocol specific credential (uuid, password or `method:password`).
    pub identity: String,
    /// Transport hint such as `tcp` or `ws`.
    pub transport: String,
    /// Whether the endpoint expects a TLS handshake.
    pub tls: bool,
    /// Server name to present during the TLS handshake, if the link carries one.
    pub sni: Option<String>,
    /// Human readable remark (link fragment, vmess `ps`, outbound tag).
    pub remark: Option<String>,
    /// The link this record was decoded from, kept verbatim for output.
    pub raw: String,
    /// Country code or [`UNKNOWN_COUNTRY`].
    pub country: String,
    /// Outcome of the reachability probe.
    pub status: ProbeStatus,
}

impl ProxyConfig {
    pub(crate) fn new(protocol: Protocol, address: String, port: u16, raw: &str) -> Self {
        Self {
            protocol,
            address,
            port,
            identity: String::new(),
            transport: "tcp".into(),
            tls: protocol.implies_tls(),
            sni: None,
            remark: None,
            raw: raw.to_string(),
            country: UNKNOWN_COUNTRY.into(),
            status: ProbeStatus::Untested,
        }
    }

    /// Measured latency in milliseconds, `0.0` when the record is not reachable.
    pub fn latency_ms(&self) -> f64 {
        match self.status {
            ProbeStatus::Reachable { latency_ms } => latency_ms,
            _ => 0.0,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self.status, ProbeStatus::Reachable { .. })
    }

    /// Returns the endpoint in `<address>:<port>` form, bracketing IPv6 literals.
    pub fn endpoint(&self) -> Cow<'static, str> {
        if self.address.contains(':') {
            Cow::Owned(format!("[{}]:{}", self.address, self.port))
        } else {
            Cow::Owned(format!("{}:{}", self.address, self.port))
        }
    }

    /// Composite `address:port:protocol` identity used by the deduplicator.
    pub fn identity_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.address.to_ascii_lowercase(),
            self.port,
            self.protocol
        )
    }

    /// Server name to use for TLS, falling back to the address.
    pub fn server_name(&self) -> &str {
        self.sni
            .as_deref()
            .filter(|sni| !sni.is_empty())
            .unwrap_or(&self.address)
    }

    /// Converts the record to JSON.
    pub fn as_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Display for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<ProxyConfig {} {}", self.protocol, self.country)?;
        match &self.status {
            ProbeStatus::Untested => write!(f, " untested")?,
            ProbeStatus::Reachable { latency_ms } => write!(f, " {:.2}ms", latency_ms)?,
            ProbeStatus::Unreachable { reason } => write!(f, " unreachable ({})", reason)?,
        }
        write!(f, " {}>", self.endpoint())
    }
}
