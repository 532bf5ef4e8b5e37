use super::{
    decode_base64, parse_query, percent_decode, split_fragment, split_host_port, DecodeError,
};
use crate::proxy::models::{Protocol, ProxyConfig};

/// Decodes `ss://` links in both the fully encoded
/// `base64(method:password@host:port)` form and the SIP002
/// `base64(method:password)@host:port` form.
pub(super) fn decode_ss(raw: &str, body: &str) -> Result<ProxyConfig, DecodeError> {
    let (body, remark) = split_fragment(body);
    // plugin options never take part in the endpoint
    let body = body.split('?').next().unwrap_or_default();

    let plain = match body.rsplit_once('@') {
        Some((userinfo, endpoint)) => {
            let credential = decode_base64(userinfo).unwrap_or_else(|_| percent_decode(userinfo));
            format!("{}@{}", credential, endpoint.trim_end_matches('/'))
        }
        None => decode_base64(body)?,
    };

    let (credential, endpoint) = plain
        .split_once('@')
        .ok_or(DecodeError::Malformed("expected method:password@host:port"))?;
    let (address, port) = split_host_port(endpoint.trim())?;
    let (method, password) = credential
        .split_once(':')
        .ok_or(DecodeError::Malformed("expected method:password"))?;
    if method.is_empty() {
        return Err(DecodeError::MissingField("method"));
    }

    let mut config = ProxyConfig::new(Protocol::Shadowsocks, address, port, raw);
    config.identity = format!("{}:{}", method, password);
    config.remark = remark;
    Ok(config)
}

/// Decodes `ssr://base64(host:port:protocol:method:obfs:base64(password)/?params)`.
pub(super) fn decode_ssr(raw: &str, body: &str) -> Result<ProxyConfig, DecodeError> {
    let (body, _) = split_fragment(body);
    let decoded = decode_base64(body)?;
    let (server, params) = match decoded.split_once('/') {
        Some((server, params)) => (server, Some(params.trim_start_matches('?'))),
        None => (decoded.as_str(), None),
    };

    // a bracketed IPv6 host is split off before the colon-delimited fields
    let (host, rest) = match server.strip_prefix('[') {
        Some(bracketed) => bracketed
            .split_once("]:")
            .ok_or(DecodeError::Malformed("unterminated IPv6 host"))?,
        None => server
            .split_once(':')
            .ok_or(DecodeError::MissingField("port"))?,
    };
    if host.is_empty() {
        return Err(DecodeError::MissingField("host"));
    }

    // fields past the sixth are ignored
    let mut fields = rest.split(':');
    let port = fields.next().unwrap_or_default();
    let _protocol = fields.next().ok_or(DecodeError::MissingField("protocol"))?;
    let method = fields.next().ok_or(DecodeError::MissingField("method"))?;
    let _obfs = fields.next().ok_or(DecodeError::MissingField("obfs"))?;
    let encoded_password = fields.next().ok_or(DecodeError::MissingField("password"))?;

    let password =
        decode_base64(encoded_password).unwrap_or_else(|_| encoded_password.to_string());

    let mut config = ProxyConfig::new(
        Protocol::ShadowsocksR,
        host.to_string(),
        super::parse_port(port)?,
        raw,
    );
    config.identity = format!("{}:{}", method, password);
    config.remark = params
        .map(parse_query)
        .and_then(|query| query.get("remarks").cloned())
        .and_then(|remarks| decode_base64(&remarks).ok())
        .filter(|remarks| !remarks.trim().is_empty());
    Ok(config)
}
