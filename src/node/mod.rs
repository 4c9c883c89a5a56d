use std::fmt;

use serde::Serialize;

use crate::ping_probe::result::PingResult;
use crate::speed_probe::result::SpeedResult;
use crate::tcp_probe::result::TcpResult;
use crate::udp_probe::result::UdpResult;

/// Transport kinds a subscription link can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    #[serde(rename = "ss")]
    Shadowsocks,
    Unknown,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "ss",
            Protocol::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Per-protocol credential and transport parameters. The probing engine only
/// inspects these when building a proxy client configuration; everything else
/// treats them as opaque.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transport {
    Vmess {
        user_id: Option<String>,
        network: Option<String>,
        tls: bool,
    },
    Vless {
        user_id: Option<String>,
        network: Option<String>,
        path: Option<String>,
        tls: bool,
    },
    Trojan {
        password: Option<String>,
    },
    #[serde(rename = "ss")]
    Shadowsocks {
        method: Option<String>,
        password: Option<String>,
    },
    Unknown,
}

impl Transport {
    pub fn protocol(&self) -> Protocol {
        match self {
            Transport::Vmess { .. } => Protocol::Vmess,
            Transport::Vless { .. } => Protocol::Vless,
            Transport::Trojan { .. } => Protocol::Trojan,
            Transport::Shadowsocks { .. } => Protocol::Shadowsocks,
            Transport::Unknown => Protocol::Unknown,
        }
    }
}

/// One candidate endpoint under evaluation, decoded from a subscription link.
/// Read-only input to the probing engine; probing produces a [`NodeResult`]
/// copy instead of mutating the descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct NodeDescriptor {
    pub protocol: Protocol,
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub transport: Transport,
    pub raw: String,
}

impl NodeDescriptor {
    pub fn new(
        name: Option<String>,
        host: Option<String>,
        port: Option<u16>,
        transport: Transport,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            protocol: transport.protocol(),
            name,
            host,
            port,
            transport,
            raw: raw.into(),
        }
    }

    /// Bare descriptor for a link that could not be decoded beyond its scheme.
    pub fn undecoded(transport: Transport, raw: impl Into<String>) -> Self {
        Self::new(None, None, None, transport, raw)
    }

    /// Display label: the advertised name, or a prefix of the raw link.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.raw.chars().take(20).collect(),
        }
    }
}

/// Descriptor plus everything the probe battery measured for it. Created once
/// per node per orchestration run; absent probes stay `None`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeResult {
    #[serde(flatten)]
    pub node: NodeDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<PingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpResult>,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<SpeedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<UdpResult>,
}

impl NodeResult {
    /// Empty result: nothing measured, node not reachable.
    pub fn empty(node: NodeDescriptor) -> Self {
        Self {
            node,
            ping: None,
            tcp: None,
            reachable: false,
            speed: None,
            game: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vmess_transport() -> Transport {
        Transport::Vmess {
            user_id: Some("7b0cfd14-dd5a-4a0a-b04e-b0f97f41a9dc".to_string()),
            network: Some("ws".to_string()),
            tls: true,
        }
    }

    #[test]
    fn protocol_follows_transport() {
        let node = NodeDescriptor::new(
            None,
            Some("example.com".to_string()),
            Some(443),
            vmess_transport(),
            "vmess://abc",
        );
        assert_eq!(node.protocol, Protocol::Vmess);
        assert_eq!(node.transport.protocol(), Protocol::Vmess);
    }

    #[test]
    fn label_falls_back_to_raw_prefix() {
        let node = NodeDescriptor::undecoded(Transport::Unknown, "ss://averylonglinkbodythatkeepsgoing");
        assert_eq!(node.label(), "ss://averylonglinkbo");

        let named = NodeDescriptor::new(
            Some("HK-01".to_string()),
            None,
            None,
            Transport::Unknown,
            "ss://x",
        );
        assert_eq!(named.label(), "HK-01");
    }

    #[test]
    fn disabled_probes_serialize_absent() {
        let result = NodeResult::empty(NodeDescriptor::undecoded(Transport::Unknown, "x://y"));
        let json = serde_json::to_value(&result).expect("serializable");
        assert!(json.get("speed").is_none());
        assert!(json.get("game").is_none());
        assert!(json.get("ping").is_none());
        assert_eq!(json["reachable"], serde_json::Value::Bool(false));
        assert_eq!(json["protocol"], "unknown");
    }
}
