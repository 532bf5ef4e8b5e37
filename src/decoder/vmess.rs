use serde_json::Value;

use super::{decode_base64, json_string, parse_port, DecodeError};
use crate::proxy::models::{Protocol, ProxyConfig, UNKNOWN_COUNTRY};

/// Decodes `vmess://<base64 json>`.
pub(super) fn decode(raw: &str, body: &str) -> Result<ProxyConfig, DecodeError> {
    let (body, _) = super::split_fragment(body);
    let decoded = decode_base64(body)?;
    let json: Value = serde_json::from_str(&decoded).map_err(|e| DecodeError::Json(e.to_string()))?;
    if !json.is_object() {
        return Err(DecodeError::Malformed("vmess payload is not an object"));
    }

    let address = json_string(&json, "add")
        .filter(|add| !add.is_empty())
        .ok_or(DecodeError::MissingField("add"))?;
    let port = json_string(&json, "port").ok_or(DecodeError::MissingField("port"))?;

    let mut config = ProxyConfig::new(Protocol::Vmess, address, parse_port(&port)?, raw);
    config.identity = json_string(&json, "id").unwrap_or_default();
    if let Some(net) = json_string(&json, "net").filter(|net| !net.is_empty()) {
        config.transport = net;
    }
    config.tls = json_string(&json, "tls").is_some_and(|tls| tls.eq_ignore_ascii_case("tls"));
    config.sni = json_string(&json, "sni").filter(|sni| !sni.is_empty());

    let remark = json_string(&json, "ps").filter(|ps| !ps.is_empty());
    config.country = remark
        .as_deref()
        .and_then(country_suffix)
        .unwrap_or(UNKNOWN_COUNTRY)
        .to_string();
    config.remark = remark;
    Ok(config)
}

/// Takes the segment after the last `-` of a remark such as `Relay-DE`.
///
/// The value is unvalidated; the classifier runs it through the country validator.
fn country_suffix(remark: &str) -> Option<&str> {
    remark
        .rsplit_once('-')
        .map(|(_, suffix)| suffix.trim())
        .filter(|suffix| !suffix.is_empty())
}

/// Reads the `aid` field as an integer, for re-encoding purposes.
pub(super) fn alter_id(json: &Value) -> u64 {
    json_string(json, "aid")
        .or_else(|| json_string(json, "alter_id"))
        .and_then(|aid| aid.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::decoder::{decode as decode_link, encode_base64};

    fn link(payload: Value) -> String {
        format!("vmess://{}", encode_base64(&payload.to_string()))
    }

    #[test]
    fn decodes_string_port_and_country_suffix() {
        let raw = link(json!({
            "add": "1.2.3.4", "port": "443", "id": "uuid1", "aid": "0",
            "net": "ws", "tls": "tls", "ps": "Fast Relay-DE"
        }));
        let config = decode_link(&raw).unwrap();
        assert_eq!(config.protocol, Protocol::Vmess);
        assert_eq!(config.address, "1.2.3.4");
        assert_eq!(config.port, 443);
        assert_eq!(config.identity, "uuid1");
        assert_eq!(config.transport, "ws");
        assert!(config.tls);
        assert_eq!(config.country, "DE");
        assert_eq!(config.raw, raw);
    }

    #[test]
    fn numeric_port_and_missing_remark() {
        let raw = link(json!({"add": "edge.example.net", "port": 8080, "id": "abcd"}));
        let config = decode_link(&raw).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.transport, "tcp");
        assert!(!config.tls);
        assert_eq!(config.country, UNKNOWN_COUNTRY);
    }

    #[test]
    fn unpadded_payload_is_accepted() {
        let raw = link(json!({"add": "1.2.3.4", "port": "443", "id": "uuid1", "net": "tcp"}));
        let unpadded = raw.trim_end_matches('=');
        assert_eq!(decode_link(unpadded).unwrap().port, 443);
    }

    #[test]
    fn rejects_out_of_range_ports_and_missing_address() {
        assert!(decode_link(&link(json!({"add": "1.2.3.4", "port": "0", "id": "x"}))).is_err());
        assert!(decode_link(&link(json!({"add": "1.2.3.4", "port": "99999", "id": "x"}))).is_err());
        assert!(decode_link(&link(json!({"add": "", "port": "443", "id": "x"}))).is_err());
        assert!(decode_link(&link(json!({"port": "443"}))).is_err());
        assert!(decode_link("vmess://not-base64!!").is_err());
        assert!(decode_link(&format!("vmess://{}", encode_base64("[1, 2]"))).is_err());
    }

    #[test]
    fn alter_id_accepts_strings_and_numbers() {
        assert_eq!(alter_id(&json!({"aid": "64"})), 64);
        assert_eq!(alter_id(&json!({"alter_id": 2})), 2);
        assert_eq!(alter_id(&json!({})), 0);
    }
}
