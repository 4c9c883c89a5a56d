use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::node::{NodeDescriptor, Transport};

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(vless|vmess|trojan|ss)://[^\s'"<>]+"#).expect("link regex"));

/// All proxy links embedded in `text`, in document order.
pub fn find_links(text: &str) -> Vec<String> {
    LINK_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Base64 with tolerance for missing or present padding and for the URL-safe
/// alphabet; subscription links are sloppy about both.
pub fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let trimmed = input.trim().trim_end_matches('=');
    STANDARD_NO_PAD
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed))
        .ok()
}

/// Decodes one link into a descriptor. Never fails: a link that cannot be
/// decoded beyond its scheme keeps the protocol tag and the raw text.
pub fn parse_link(link: &str) -> NodeDescriptor {
    let scheme = link
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .unwrap_or_default();
    match scheme.as_str() {
        "vmess" => parse_vmess(link),
        "vless" => parse_vless(link),
        "trojan" => parse_trojan(link),
        "ss" => parse_ss(link),
        _ => NodeDescriptor::undecoded(Transport::Unknown, link),
    }
}

// vmess://<base64 JSON payload>
fn parse_vmess(link: &str) -> NodeDescriptor {
    let empty = || {
        NodeDescriptor::undecoded(
            Transport::Vmess {
                user_id: None,
                network: None,
                tls: false,
            },
            link,
        )
    };

    let body = &link["vmess://".len()..];
    let Some(bytes) = decode_base64(body) else {
        return empty();
    };
    let Ok(payload) = serde_json::from_slice::<Value>(&bytes) else {
        return empty();
    };

    let name = string_field(&payload, &["ps", "name"]);
    let host = string_field(&payload, &["add", "host"]);
    let port = port_field(&payload, "port");
    let transport = Transport::Vmess {
        user_id: string_field(&payload, &["id", "uuid"]),
        network: string_field(&payload, &["net"]),
        tls: string_field(&payload, &["tls"]).is_some_and(|v| !v.is_empty() && v != "none"),
    };
    NodeDescriptor::new(name, host, port, transport, link)
}

// vless://<uuid>@host:port?query#name
fn parse_vless(link: &str) -> NodeDescriptor {
    let Ok(url) = Url::parse(link) else {
        return NodeDescriptor::undecoded(
            Transport::Vless {
                user_id: None,
                network: None,
                path: None,
                tls: false,
            },
            link,
        );
    };

    let user_id = match url.username() {
        "" => None,
        user => Some(user.to_string()),
    };
    let query = |key: &str| {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    };
    let tls = query("security").as_deref() == Some("tls") || query("tls").as_deref() == Some("tls");
    let transport = Transport::Vless {
        user_id,
        network: query("type"),
        path: query("path"),
        tls,
    };
    NodeDescriptor::new(
        fragment_name(&url),
        url.host_str().map(str::to_string),
        url.port(),
        transport,
        link,
    )
}

// trojan://password@host:port?params#name
fn parse_trojan(link: &str) -> NodeDescriptor {
    let Ok(url) = Url::parse(link) else {
        return NodeDescriptor::undecoded(Transport::Trojan { password: None }, link);
    };
    let password = match url.username() {
        "" => None,
        user => Some(user.to_string()),
    };
    NodeDescriptor::new(
        fragment_name(&url),
        url.host_str().map(str::to_string),
        url.port(),
        Transport::Trojan { password },
        link,
    )
}

// ss://method:password@host:port or ss://<base64 of the same>, with an
// optional #name fragment.
fn parse_ss(link: &str) -> NodeDescriptor {
    let body = &link["ss://".len()..];
    let (body, name) = match body.split_once('#') {
        Some((body, fragment)) => (
            body,
            Some(percent_decode_str(fragment).decode_utf8_lossy().into_owned()),
        ),
        None => (body, None),
    };

    if let Some((head, addr)) = body.split_once('@') {
        let (method, password) = match head.split_once(':') {
            Some((method, password)) => (Some(method.to_string()), Some(password.to_string())),
            None => (None, None),
        };
        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), port.parse().ok()),
            None => (addr.to_string(), None),
        };
        let host = if host.is_empty() { None } else { Some(host) };
        return NodeDescriptor::new(
            name,
            host,
            port,
            Transport::Shadowsocks { method, password },
            link,
        );
    }

    // fully base64-encoded body
    if let Some(bytes) = decode_base64(body) {
        let decoded = String::from_utf8_lossy(&bytes).into_owned();
        if decoded.contains('@') {
            let mut node = parse_ss(&format!("ss://{decoded}"));
            node.raw = link.to_string();
            if node.name.is_none() {
                node.name = name;
            }
            return node;
        }
    }

    NodeDescriptor::undecoded(
        Transport::Shadowsocks {
            method: None,
            password: None,
        },
        link,
    )
}

fn fragment_name(url: &Url) -> Option<String> {
    url.fragment()
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| percent_decode_str(fragment).decode_utf8_lossy().into_owned())
}

fn string_field(payload: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match payload.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

// vmess payloads carry the port as either a number or a string
fn port_field(payload: &Value, key: &str) -> Option<u16> {
    match payload.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Protocol;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn finds_links_case_insensitively() {
        let text = "a VMESS://abc b ss://def c http://not-a-node";
        let links = find_links(text);
        assert_eq!(links, vec!["VMESS://abc", "ss://def"]);
    }

    #[test]
    fn parses_vmess_json_payload() {
        let payload = serde_json::json!({
            "ps": "JP-Tokyo",
            "add": "tokyo.example.net",
            "port": "8443",
            "id": "7b0cfd14-dd5a-4a0a-b04e-b0f97f41a9dc",
            "net": "ws",
            "tls": "tls"
        });
        let link = format!("vmess://{}", STANDARD.encode(payload.to_string()));
        let node = parse_link(&link);

        assert_eq!(node.protocol, Protocol::Vmess);
        assert_eq!(node.name.as_deref(), Some("JP-Tokyo"));
        assert_eq!(node.host.as_deref(), Some("tokyo.example.net"));
        assert_eq!(node.port, Some(8443));
        match &node.transport {
            Transport::Vmess { user_id, network, tls } => {
                assert_eq!(user_id.as_deref(), Some("7b0cfd14-dd5a-4a0a-b04e-b0f97f41a9dc"));
                assert_eq!(network.as_deref(), Some("ws"));
                assert!(tls);
            }
            other => panic!("wrong transport: {other:?}"),
        }
    }

    #[test]
    fn vmess_with_numeric_port_and_garbage_payload() {
        let payload = serde_json::json!({"add": "h.example.net", "port": 443, "id": "u"});
        let link = format!("vmess://{}", STANDARD.encode(payload.to_string()));
        assert_eq!(parse_link(&link).port, Some(443));

        let broken = parse_link("vmess://%%%notbase64%%%");
        assert_eq!(broken.protocol, Protocol::Vmess);
        assert_eq!(broken.host, None);
        assert_eq!(broken.raw, "vmess://%%%notbase64%%%");
    }

    #[test]
    fn parses_vless_url_form() {
        let link = "vless://8a41f0f9-e6e9-4d06-9b4c-c53b3a764a33@edge.example.net:8443?type=ws&path=%2Ftunnel&security=tls#SG%20Prime";
        let node = parse_link(link);

        assert_eq!(node.protocol, Protocol::Vless);
        assert_eq!(node.name.as_deref(), Some("SG Prime"));
        assert_eq!(node.host.as_deref(), Some("edge.example.net"));
        assert_eq!(node.port, Some(8443));
        match &node.transport {
            Transport::Vless { user_id, network, path, tls } => {
                assert_eq!(user_id.as_deref(), Some("8a41f0f9-e6e9-4d06-9b4c-c53b3a764a33"));
                assert_eq!(network.as_deref(), Some("ws"));
                assert_eq!(path.as_deref(), Some("/tunnel"));
                assert!(tls);
            }
            other => panic!("wrong transport: {other:?}"),
        }
    }

    #[test]
    fn parses_trojan_url_form() {
        let node = parse_link("trojan://hunter2@gate.example.net:443?sni=gate#DE");
        assert_eq!(node.protocol, Protocol::Trojan);
        assert_eq!(node.name.as_deref(), Some("DE"));
        assert_eq!(node.host.as_deref(), Some("gate.example.net"));
        assert_eq!(node.port, Some(443));
        match &node.transport {
            Transport::Trojan { password } => assert_eq!(password.as_deref(), Some("hunter2")),
            other => panic!("wrong transport: {other:?}"),
        }
    }

    #[test]
    fn parses_ss_plain_and_base64_forms() {
        let plain = parse_link("ss://aes-256-gcm:sekrit@ss.example.net:8388#US");
        assert_eq!(plain.protocol, Protocol::Shadowsocks);
        assert_eq!(plain.name.as_deref(), Some("US"));
        assert_eq!(plain.host.as_deref(), Some("ss.example.net"));
        assert_eq!(plain.port, Some(8388));
        match &plain.transport {
            Transport::Shadowsocks { method, password } => {
                assert_eq!(method.as_deref(), Some("aes-256-gcm"));
                assert_eq!(password.as_deref(), Some("sekrit"));
            }
            other => panic!("wrong transport: {other:?}"),
        }

        let encoded = format!(
            "ss://{}",
            STANDARD.encode("aes-256-gcm:sekrit@ss.example.net:8388")
        );
        let node = parse_link(&encoded);
        assert_eq!(node.host.as_deref(), Some("ss.example.net"));
        assert_eq!(node.port, Some(8388));
        assert_eq!(node.raw, encoded);
    }

    #[test]
    fn undecodable_ss_keeps_protocol_tag() {
        let node = parse_link("ss://!!!!");
        assert_eq!(node.protocol, Protocol::Shadowsocks);
        assert_eq!(node.host, None);
        assert_eq!(node.port, None);
    }

    #[test]
    fn base64_decoder_tolerates_padding_variants() {
        assert_eq!(decode_base64("aGk=").as_deref(), Some(b"hi".as_slice()));
        assert_eq!(decode_base64("aGk").as_deref(), Some(b"hi".as_slice()));
        assert!(decode_base64("not base64 at all!").is_none());
    }
}
