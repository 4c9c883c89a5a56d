use serde::Deserialize;

/// Probe battery settings for one orchestration run.
/// Every section is optional in the YAML file and falls back to defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    /// Upper bound on nodes probed in parallel.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub ping: PingSettings,

    #[serde(default)]
    pub tcp: TcpSettings,

    #[serde(default)]
    pub speed: SpeedSettings,

    #[serde(default)]
    pub udp: UdpSettings,

    #[serde(default)]
    pub proxy: ProxySettings,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            ping: PingSettings::default(),
            tcp: TcpSettings::default(),
            speed: SpeedSettings::default(),
            udp: UdpSettings::default(),
            proxy: ProxySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingSettings {
    #[serde(default = "default_ping_count")]
    pub count: u32,

    /// Per-packet timeout handed to the ping utility.
    #[serde(default = "default_ping_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self {
            count: default_ping_count(),
            timeout_ms: default_ping_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TcpSettings {
    #[serde(default = "default_tcp_attempts")]
    pub attempts: u32,

    /// Per-attempt connect timeout.
    #[serde(default = "default_tcp_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            attempts: default_tcp_attempts(),
            timeout_secs: default_tcp_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeedSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Download target for the throughput measurement.
    #[serde(default = "default_speed_url")]
    pub url: String,

    #[serde(default = "default_speed_duration_secs")]
    pub duration_secs: u64,

    /// Concurrent download workers per node.
    #[serde(default = "default_speed_concurrency")]
    pub concurrency: u32,
}

impl Default for SpeedSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_speed_url(),
            duration_secs: default_speed_duration_secs(),
            concurrency: default_speed_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdpSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Echo target as `host:port`.
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default = "default_udp_duration_secs")]
    pub duration_secs: u64,

    #[serde(default = "default_udp_packet_size")]
    pub packet_size: usize,

    #[serde(default = "default_udp_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub expect_echo: bool,
}

impl UdpSettings {
    /// Splits `target` into host and port; `None` when missing or malformed.
    pub fn target_parts(&self) -> Option<(String, u16)> {
        let target = self.target.as_deref()?;
        let (host, port) = target.rsplit_once(':')?;
        let port = port.parse().ok()?;
        if host.is_empty() {
            return None;
        }
        Some((host.to_string(), port))
    }
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            target: None,
            duration_secs: default_udp_duration_secs(),
            packet_size: default_udp_packet_size(),
            interval_ms: default_udp_interval_ms(),
            expect_echo: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    #[serde(default)]
    pub enabled: bool,

    /// Path to the local proxy client binary.
    #[serde(default = "default_proxy_binary")]
    pub binary: String,

    #[serde(default = "default_proxy_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: default_proxy_binary(),
            startup_timeout_secs: default_proxy_startup_timeout_secs(),
        }
    }
}

fn default_workers() -> usize {
    10
}

fn default_ping_count() -> u32 {
    4
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

fn default_tcp_attempts() -> u32 {
    6
}

fn default_tcp_timeout_secs() -> u64 {
    3
}

fn default_speed_url() -> String {
    "http://speedtest.tele2.net/5MB.zip".to_string()
}

fn default_speed_duration_secs() -> u64 {
    10
}

fn default_speed_concurrency() -> u32 {
    1
}

fn default_udp_duration_secs() -> u64 {
    5
}

fn default_udp_packet_size() -> usize {
    60
}

fn default_udp_interval_ms() -> u64 {
    20
}

fn default_proxy_binary() -> String {
    "xray".to_string()
}

fn default_proxy_startup_timeout_secs() -> u64 {
    5
}
