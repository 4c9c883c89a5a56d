use std::env;
use std::error::Error;
use std::path::PathBuf;

use serde::Deserialize;

use super::probe_config::ProbeSettings;

/// Where the subscription text comes from.
#[derive(Debug, Clone)]
pub enum SubscriptionSource {
    Url(String),
    File(PathBuf),
}

pub struct AppConfig {
    pub settings: ProbeSettings,
    pub subscription: SubscriptionSource,
    pub output: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    subscription: SubscriptionConfig,

    #[serde(default = "default_output")]
    output: PathBuf,

    #[serde(flatten)]
    probes: ProbeSettings,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionConfig {
    url: Option<String>,
    file: Option<PathBuf>,
}

fn default_output() -> PathBuf {
    PathBuf::from("nodes.json")
}

/// Load the application configuration from a YAML file and environment
/// variables. The file is located via the `CONFIG_FILE` environment variable
/// (default `config.yml`); `SUBSCRIPTION_URL` overrides the configured
/// subscription source.
pub fn load_config() -> Result<AppConfig, Box<dyn Error>> {
    let config_file_location = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.yml".to_string());
    let config_str = std::fs::read_to_string(&config_file_location)
        .map_err(|err| format!("failed to read {config_file_location}: {err}"))?;
    let file: ConfigFile = serde_yaml::from_str(&config_str)
        .map_err(|err| format!("invalid YAML in {config_file_location}: {err}"))?;

    let subscription = if let Ok(url) = env::var("SUBSCRIPTION_URL") {
        SubscriptionSource::Url(url)
    } else if let Some(url) = file.subscription.url {
        SubscriptionSource::Url(url)
    } else if let Some(path) = file.subscription.file {
        SubscriptionSource::File(path)
    } else {
        return Err("no subscription source: set subscription.url, subscription.file or SUBSCRIPTION_URL".into());
    };

    log::info!("loaded configuration from {config_file_location}");

    Ok(AppConfig {
        settings: file.probes,
        subscription,
        output: file.output,
    })
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn config_file_deserialization() {
        let yaml = r#"
            subscription:
                url: https://provider.example.net/sub
            output: out/results.json
            workers: 3
            ping:
                count: 2
        "#;
        let file: ConfigFile = serde_yaml::from_str(yaml).expect("valid YAML");
        assert_eq!(file.subscription.url.as_deref(), Some("https://provider.example.net/sub"));
        assert_eq!(file.output, PathBuf::from("out/results.json"));
        assert_eq!(file.probes.workers, 3);
        assert_eq!(file.probes.ping.count, 2);
        // untouched sections keep their defaults
        assert_eq!(file.probes.tcp.attempts, 6);
    }

    #[test]
    fn subscription_file_source() {
        let yaml = r#"
            subscription:
                file: local-subscription.txt
        "#;
        let file: ConfigFile = serde_yaml::from_str(yaml).expect("valid YAML");
        assert_eq!(file.subscription.file, Some(PathBuf::from("local-subscription.txt")));
        assert_eq!(file.output, PathBuf::from("nodes.json"));
    }
}
