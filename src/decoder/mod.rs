//! Turns proxy links (and SingBox outbound objects) into [`ProxyConfig`] records.
//!
//! Every decoder is a pure function over the link text. A failure anywhere in a
//! decoder surfaces as a [`DecodeError`]; callers are expected to drop the link
//! and move on.

mod lightweight;
mod shadowsocks;
pub mod singbox;
mod uri;
mod vmess;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use hashbrown::HashMap;
use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::proxy::models::{Protocol, ProxyConfig};

/// Errors produced while decoding a single link.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid base64: {0}")]
    Base64(String),
    #[error("decoded payload is not valid utf-8")]
    Utf8,
    #[error("invalid json: {0}")]
    Json(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("malformed link: {0}")]
    Malformed(&'static str),
}

type DecodeFn = fn(&str, &str) -> Result<ProxyConfig, DecodeError>;

/// Scheme dispatch table. Each entry receives the whole link and the text after `://`.
static SCHEMES: [(&str, DecodeFn); 13] = [
    ("vmess", vmess::decode),
    ("vless", |raw, body| uri::decode(Protocol::Vless, raw, body)),
    ("trojan", |raw, body| uri::decode(Protocol::Trojan, raw, body)),
    ("ss", shadowsocks::decode_ss),
    ("ssr", shadowsocks::decode_ssr),
    ("hysteria", |raw, body| {
        lightweight::decode(Protocol::Hysteria, raw, body)
    }),
    ("hysteria2", |raw, body| {
        lightweight::decode(Protocol::Hysteria2, raw, body)
    }),
    ("hy2", |raw, body| {
        lightweight::decode(Protocol::Hysteria2, raw, body)
    }),
    ("wireguard", |raw, body| {
        lightweight::decode(Protocol::WireGuard, raw, body)
    }),
    ("wg", |raw, body| {
        lightweight::decode(Protocol::WireGuard, raw, body)
    }),
    ("tuic", |raw, body| lightweight::decode(Protocol::Tuic, raw, body)),
    ("naive", |raw, body| lightweight::decode(Protocol::Naive, raw, body)),
    ("naive+https", |raw, body| {
        lightweight::decode(Protocol::Naive, raw, body)
    }),
];

/// Decodes one link or SingBox outbound object.
///
/// # Arguments
///
/// * `raw`: A proxy link such as `vless://...`, or a JSON outbound object.
///
/// # Returns
///
/// The decoded record, or the reason the input was rejected.
pub fn decode(raw: &str) -> Result<ProxyConfig, DecodeError> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        return singbox::decode_str(raw);
    }

    let (scheme, body) = raw
        .split_once("://")
        .ok_or(DecodeError::Malformed("missing scheme separator"))?;
    let scheme = scheme.to_ascii_lowercase();

    SCHEMES
        .iter()
        .find(|(name, _)| *name == scheme)
        .map(|(_, decode_fn)| decode_fn(raw, body))
        .unwrap_or_else(|| Err(DecodeError::UnsupportedScheme(scheme)))
}

/// Decodes every input, returning the successes and the number of failures.
pub fn decode_all<I, S>(raws: I) -> (Vec<ProxyConfig>, usize)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut configs = vec![];
    let mut failed = 0;
    for raw in raws {
        match decode(raw.as_ref()) {
            Ok(config) => configs.push(config),
            Err(_e) => {
                #[cfg(feature = "log")]
                log::trace!("dropping {:.48}: {}", raw.as_ref(), _e);
                failed += 1;
            }
        }
    }
    (configs, failed)
}

const LENIENT_CONFIG: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_allow_trailing_bits(true)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent);
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_CONFIG);
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_CONFIG);

/// Decodes base64 text, completing missing padding and falling back to the
/// URL-safe alphabet.
pub(crate) fn decode_base64(input: &str) -> Result<String, DecodeError> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let trimmed = cleaned.trim_end_matches('=');
    if trimmed.is_empty() {
        return Err(DecodeError::Base64("empty payload".into()));
    }
    let padded = format!("{}{}", trimmed, "=".repeat((4 - trimmed.len() % 4) % 4));

    let bytes = LENIENT_STANDARD
        .decode(&padded)
        .or_else(|_| LENIENT_URL_SAFE.decode(&padded))
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)
}

/// Encodes text with the standard alphabet, used when re-creating links.
pub(crate) fn encode_base64(input: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(input)
}

/// Parses a port, accepting only `1..=65535`.
pub(crate) fn parse_port(value: &str) -> Result<u16, DecodeError> {
    match value.trim().parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err(DecodeError::InvalidPort(value.trim().to_string())),
    }
}

/// Reads a JSON field that may be either a string or a number.
pub(crate) fn json_string(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Splits `text#fragment`, percent-decoding the fragment into a remark.
pub(crate) fn split_fragment(text: &str) -> (&str, Option<String>) {
    match text.split_once('#') {
        Some((head, fragment)) => (head, decode_remark(fragment)),
        None => (text, None),
    }
}

pub(crate) fn decode_remark(fragment: &str) -> Option<String> {
    let remark = percent_decode_str(fragment).decode_utf8_lossy().trim().to_string();
    Some(remark).filter(|r| !r.is_empty())
}

pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

pub(crate) fn percent_decode(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}

/// Splits `host:port`, stripping IPv6 brackets from the host.
pub(crate) fn split_host_port(text: &str) -> Result<(String, u16), DecodeError> {
    let (host, port) = text
        .rsplit_once(':')
        .ok_or(DecodeError::Malformed("missing port"))?;
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(DecodeError::MissingField("address"));
    }
    Ok((host.to_string(), parse_port(port)?))
}

/// First non-empty value among `keys` in a parsed query.
pub(crate) fn query_value(query: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| query.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_padding_is_completed() {
        let encoded = encode_base64("method:secret@host.example:8388");
        let unpadded = encoded.trim_end_matches('=');
        assert_eq!(
            decode_base64(unpadded).unwrap(),
            "method:secret@host.example:8388"
        );
    }

    #[test]
    fn url_safe_alphabet_is_accepted() {
        assert_eq!(decode_base64("Pz8_").unwrap(), "???");
        assert_eq!(decode_base64("Pz8/").unwrap(), "???");
        assert!(decode_base64("").is_err());
    }

    #[test]
    fn port_bounds_are_enforced() {
        assert_eq!(parse_port("443"), Ok(443));
        assert_eq!(parse_port("65535"), Ok(65535));
        assert!(parse_port("0").is_err());
        assert!(parse_port("99999").is_err());
        assert!(parse_port("-1").is_err());
        assert!(parse_port("http").is_err());
    }

    #[test]
    fn unknown_schemes_are_rejected() {
        assert_eq!(
            decode("socks5://1.2.3.4:1080"),
            Err(DecodeError::UnsupportedScheme("socks5".into()))
        );
        assert!(decode("not a link").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn decode_all_counts_failures() {
        let (configs, failed) = decode_all([
            "trojan://password123@example.com:443#A",
            "vless://garbage",
            "ss://!!!",
        ]);
        assert_eq!(configs.len(), 1);
        assert_eq!(failed, 2);
    }
}
