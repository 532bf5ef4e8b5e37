use once_cell::sync::Lazy;
use regex::Regex;

use super::{decode_remark, parse_port, parse_query, percent_decode, query_value, DecodeError};
use crate::proxy::models::{Protocol, ProxyConfig};

/// `credential@host:port[/][?query][#fragment]`
static CREDENTIAL_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<credential>[^@]+)@(?P<host>\[[0-9A-Fa-f:.]+\]|[^:/?#@\[\]]+):(?P<port>\d+)/?(?:\?(?P<query>[^#]*))?(?:#(?P<fragment>.*))?$",
    )
    .expect("credential uri pattern is valid")
});

/// Decodes the `vless://` and `trojan://` link grammar.
///
/// Trojan is always TLS; vless only when the query declares `security=tls`.
pub(super) fn decode(protocol: Protocol, raw: &str, body: &str) -> Result<ProxyConfig, DecodeError> {
    let captures = CREDENTIAL_URI
        .captures(body.trim())
        .ok_or(DecodeError::Malformed("expected credential@host:port"))?;

    let host = captures["host"].trim_start_matches('[').trim_end_matches(']');
    let port = parse_port(&captures["port"])?;
    let query = captures
        .name("query")
        .map(|query| parse_query(query.as_str()))
        .unwrap_or_default();

    let mut config = ProxyConfig::new(protocol, host.to_string(), port, raw);
    config.identity = percent_decode(&captures["credential"]);
    if let Some(transport) = query_value(&query, &["type", "network"]) {
        config.transport = transport;
    }
    config.tls = match protocol {
        Protocol::Vless => query_value(&query, &["security"])
            .is_some_and(|security| security.eq_ignore_ascii_case("tls")),
        _ => true,
    };
    config.sni = query_value(&query, &["sni", "peer"]);
    config.remark = captures
        .name("fragment")
        .and_then(|fragment| decode_remark(fragment.as_str()));
    Ok(config)
}
