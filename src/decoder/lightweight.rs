use super::{parse_query, percent_decode, query_value, split_fragment, split_host_port, DecodeError};
use crate::proxy::models::{Protocol, ProxyConfig};

/// Query keys that carry the identity for each protocol, in lookup order.
fn identity_keys(protocol: Protocol) -> &'static [&'static str] {
    match protocol {
        Protocol::Hysteria => &["auth", "auth_str"],
        Protocol::Hysteria2 => &["auth", "password"],
        Protocol::Tuic => &["uuid", "password"],
        Protocol::WireGuard => &["publickey", "public_key", "publicKey"],
        _ => &["password"],
    }
}

/// Whether the identity in the query string wins over the `user@` segment.
fn query_identity_first(protocol: Protocol) -> bool {
    matches!(protocol, Protocol::Hysteria | Protocol::WireGuard)
}

/// Decodes the `scheme://[credential@]host:port[?query][#fragment]` family used
/// by hysteria, hysteria2, tuic, wireguard and naive links.
pub(super) fn decode(protocol: Protocol, raw: &str, body: &str) -> Result<ProxyConfig, DecodeError> {
    let (body, remark) = split_fragment(body);
    let (server_info, query) = match body.split_once('?') {
        Some((server_info, query)) => (server_info, parse_query(query)),
        None => (body, Default::default()),
    };
    let server_info = server_info.trim().trim_end_matches('/');

    let (credential, endpoint) = match server_info.rsplit_once('@') {
        Some((credential, endpoint)) => (Some(percent_decode(credential)), endpoint),
        None => (None, server_info),
    };
    let credential = credential.filter(|credential| !credential.is_empty());
    let (address, port) = split_host_port(endpoint)?;

    let from_query = query_value(&query, identity_keys(protocol));
    let identity = if query_identity_first(protocol) {
        from_query.or(credential)
    } else {
        credential.or(from_query)
    };

    let mut config = ProxyConfig::new(protocol, address, port, raw);
    config.identity = identity.unwrap_or_default();
    if let Some(transport) = query_value(&query, &["type", "network", "protocol"]) {
        config.transport = transport;
    }
    config.tls = query_value(&query, &["security"])
        .is_some_and(|security| security.eq_ignore_ascii_case("tls"))
        || query_value(&query, &["tls"])
            .is_some_and(|tls| tls == "1" || tls.eq_ignore_ascii_case("true"));
    config.sni = query_value(&query, &["sni", "peer"]);
    config.remark = remark;
    Ok(config)
}
