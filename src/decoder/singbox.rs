//! SingBox style JSON outbounds.
//!
//! Outbounds are decoded straight from their typed fields and a link is
//! re-created for them, since everything downstream emits links.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::{json, Value};

use super::{encode_base64, json_string, parse_port, vmess, DecodeError};
use crate::proxy::models::{Protocol, ProxyConfig};

/// Flattens a fetched JSON document into individual outbound objects.
///
/// Accepts a document with an `outbounds` array, a bare array of outbounds or
/// a single outbound. Selector outbounds whose `outbounds` field holds objects
/// are expanded one level; entries that are not objects (tag references) are
/// skipped.
pub fn expand(document: &Value) -> Vec<Value> {
    let items: Vec<&Value> = match document {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => match document.get("outbounds").and_then(Value::as_array) {
            Some(items) => items.iter().collect(),
            None => vec![document],
        },
        _ => vec![],
    };

    let mut outbounds = vec![];
    for item in items {
        match item.get("outbounds").and_then(Value::as_array) {
            Some(children) => outbounds.extend(children.iter().filter(|c| c.is_object()).cloned()),
            None if item.is_object() => outbounds.push(item.clone()),
            None => {}
        }
    }
    outbounds
}

/// Decodes an outbound given as JSON text.
pub fn decode_str(text: &str) -> Result<ProxyConfig, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;
    decode_outbound(&value)
}

/// Decodes one `vmess`, `vless`, `trojan` or `shadowsocks` outbound.
///
/// # Arguments
///
/// * `outbound`: The outbound object.
///
/// # Returns
///
/// A record whose `raw` is the equivalent link.
pub fn decode_outbound(outbound: &Value) -> Result<ProxyConfig, DecodeError> {
    let kind = json_string(outbound, "type").ok_or(DecodeError::MissingField("type"))?;
    let protocol = match kind.parse::<Protocol>() {
        Ok(protocol @ (Protocol::Vmess | Protocol::Vless | Protocol::Trojan | Protocol::Shadowsocks)) => {
            protocol
        }
        _ => return Err(DecodeError::UnsupportedScheme(kind)),
    };

    let server = json_string(outbound, "server")
        .filter(|server| !server.is_empty())
        .ok_or(DecodeError::MissingField("server"))?;
    let port = json_string(outbound, "server_port").ok_or(DecodeError::MissingField("server_port"))?;
    let mut config = ProxyConfig::new(protocol, server, parse_port(&port)?, "");

    config.identity = match protocol {
        Protocol::Vmess | Protocol::Vless => {
            json_string(outbound, "uuid").ok_or(DecodeError::MissingField("uuid"))?
        }
        Protocol::Trojan => {
            json_string(outbound, "password").ok_or(DecodeError::MissingField("password"))?
        }
        _ => {
            let method = json_string(outbound, "method").ok_or(DecodeError::MissingField("method"))?;
            let password =
                json_string(outbound, "password").ok_or(DecodeError::MissingField("password"))?;
            format!("{}:{}", method, password)
        }
    };

    let transport = outbound.get("transport");
    if let Some(kind) = transport
        .and_then(|transport| json_string(transport, "type"))
        .filter(|kind| !kind.is_empty())
    {
        config.transport = kind;
    }

    let tls = outbound.get("tls");
    config.tls = protocol.implies_tls()
        || tls.and_then(|tls| tls.get("enabled")).and_then(Value::as_bool) == Some(true)
        || transport.and_then(|t| t.get("tls")).and_then(Value::as_bool) == Some(true);
    config.sni = tls
        .and_then(|tls| json_string(tls, "server_name"))
        .filter(|sni| !sni.is_empty());
    config.remark = json_string(outbound, "tag").filter(|tag| !tag.is_empty());
    config.raw = to_link(&config, vmess::alter_id(outbound));
    Ok(config)
}

fn encode_component(text: &str) -> String {
    utf8_percent_encode(text, NON_ALPHANUMERIC).to_string()
}

fn host_part(address: &str) -> String {
    if address.contains(':') {
        format!("[{}]", address)
    } else {
        address.to_string()
    }
}

fn fragment(config: &ProxyConfig) -> String {
    config
        .remark
        .as_deref()
        .map(|remark| format!("#{}", encode_component(remark)))
        .unwrap_or_default()
}

/// Re-encodes a record as a link of its protocol.
fn to_link(config: &ProxyConfig, alter_id: u64) -> String {
    let sni = config
        .sni
        .as_deref()
        .map(|sni| format!("&sni={}", encode_component(sni)))
        .unwrap_or_default();

    match config.protocol {
        Protocol::Vmess => {
            let payload = json!({
                "v": "2",
                "ps": config.remark.clone().unwrap_or_default(),
                "add": config.address,
                "port": config.port.to_string(),
                "id": config.identity,
                "aid": alter_id.to_string(),
                "net": config.transport,
                "type": "none",
                "tls": if config.tls { "tls" } else { "" },
                "sni": config.sni.clone().unwrap_or_default(),
            });
            format!("vmess://{}", encode_base64(&payload.to_string()))
        }
        Protocol::Vless => format!(
            "vless://{}@{}:{}?type={}&security={}{}{}",
            encode_component(&config.identity),
            host_part(&config.address),
            config.port,
            encode_component(&config.transport),
            if config.tls { "tls" } else { "none" },
            sni,
            fragment(config)
        ),
        Protocol::Trojan => format!(
            "trojan://{}@{}:{}?type={}&security=tls{}{}",
            encode_component(&config.identity),
            host_part(&config.address),
            config.port,
            encode_component(&config.transport),
            sni,
            fragment(config)
        ),
        _ => format!(
            "ss://{}{}",
            encode_base64(&format!(
                "{}@{}:{}",
                config.identity,
                host_part(&config.address),
                config.port
            )),
            fragment(config)
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::decoder::decode;

    fn assert_round_trip(outbound: Value) -> ProxyConfig {
        let config = decode_outbound(&outbound).unwrap();
        let again = decode(&config.raw).unwrap();
        assert_eq!(again.protocol, config.protocol);
        assert_eq!(again.address, config.address);
        assert_eq!(again.port, config.port);
        assert_eq!(again.identity, config.identity);
        assert_eq!(again.tls, config.tls);
        config
    }

    #[test]
    fn vmess_outbound_round_trips() {
        let config = assert_round_trip(json!({
            "type": "vmess", "tag": "vm-NL", "server": "vm.example.com", "server_port": 443,
            "uuid": "6b0f5a02-2f0e-4bd5-a0a4-2b1d4c0e2f11", "alter_id": 0,
            "transport": {"type": "ws"}, "tls": {"enabled": true, "server_name": "vm.example.com"}
        }));
        assert!(config.raw.starts_with("vmess://"));
        assert_eq!(config.transport, "ws");
        assert!(config.tls);
        assert_eq!(decode(&config.raw).unwrap().country, "NL");
    }

    #[test]
    fn vless_outbound_round_trips() {
        let config = assert_round_trip(json!({
            "type": "vless", "tag": "Paris 🇫🇷", "server": "2001:db8::9", "server_port": "8443",
            "uuid": "1d2c3b4a-0000-4000-8000-aabbccddeeff", "tls": {"enabled": true}
        }));
        assert!(config.raw.starts_with("vless://"));
        assert_eq!(decode(&config.raw).unwrap().remark.as_deref(), Some("Paris 🇫🇷"));
    }

    #[test]
    fn trojan_outbound_round_trips_with_reserved_characters() {
        let config = assert_round_trip(json!({
            "type": "trojan", "server": "tj.example.org", "server_port": 443, "password": "p@ss:w#rd?"
        }));
        assert_eq!(config.identity, "p@ss:w#rd?");
        assert!(config.tls);
    }

    #[test]
    fn shadowsocks_outbound_round_trips() {
        let config = assert_round_trip(json!({
            "type": "shadowsocks", "server": "198.51.100.4", "server_port": 8388,
            "method": "2022-blake3-aes-128-gcm", "password": "c2VjcmV0LXNlY3JldA=="
        }));
        assert_eq!(config.protocol, Protocol::Shadowsocks);
        assert_eq!(config.identity, "2022-blake3-aes-128-gcm:c2VjcmV0LXNlY3JldA==");
    }

    #[test]
    fn transport_tls_flag_is_honoured() {
        let config = decode_outbound(&json!({
            "type": "vless", "server": "a.example", "server_port": 443, "uuid": "u",
            "transport": {"type": "grpc", "tls": true}
        }))
        .unwrap();
        assert!(config.tls);
        assert_eq!(config.transport, "grpc");
    }

    #[test]
    fn unsupported_or_incomplete_outbounds_are_rejected() {
        assert!(decode_outbound(&json!({"type": "direct", "tag": "direct"})).is_err());
        assert!(decode_outbound(&json!({"type": "vless", "server": "a", "server_port": 0, "uuid": "u"})).is_err());
        assert!(decode_outbound(&json!({"type": "trojan", "server": "a", "server_port": 443})).is_err());
        assert!(decode_str("{not json").is_err());
    }

    #[test]
    fn expands_documents_and_selectors_one_level() {
        let document = json!({
            "outbounds": [
                {"type": "trojan", "server": "a.example", "server_port": 443, "password": "x"},
                {"type": "selector", "tag": "proxy", "outbounds": [
                    {"type": "vless", "server": "b.example", "server_port": 443, "uuid": "u"},
                    "direct"
                ]},
                {"type": "direct", "tag": "direct"}
            ]
        });
        let outbounds = expand(&document);
        assert_eq!(outbounds.len(), 3);
        assert_eq!(outbounds[1]["server"], "b.example");

        assert_eq!(expand(&json!([{"type": "vmess"}])).len(), 1);
        assert!(expand(&json!("text")).is_empty());
    }
}
