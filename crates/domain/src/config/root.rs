use super::access::AccessConfig;
use super::dns::DnsConfig;
use super::errors::ConfigError;
use super::filtering::{FilteringConfig, REFRESH_INTERVALS_HOURS};
use super::logging::LoggingConfig;
use super::server::ServerConfig;
use crate::client::Client;
use crate::upstream::UpstreamSets;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const SCHEMA_VERSION: u32 = 1;

/// An operator account. `password` is a bcrypt hash, never plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub password: String,
}

/// The whole `warden.yaml` file. Schema migrations are the concern of an
/// external loader; this parser accepts only the current version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub users: Vec<User>,

    /// Admin session lifetime, hours.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: u64,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub filtering: FilteringConfig,

    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub clients: Vec<Client>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Working directory for `data/` (sessions, filters, query log).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            server: ServerConfig::default(),
            users: vec![],
            session_ttl_hours: default_session_ttl(),
            dns: DnsConfig::default(),
            filtering: FilteringConfig::default(),
            access: AccessConfig::default(),
            clients: vec![],
            logging: LoggingConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

/// Command-line overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub dns_port: Option<u16>,
    pub web_port: Option<u16>,
    pub bind_host: Option<String>,
}

impl Config {
    pub fn load(path: Option<&str>, overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if Path::new(p).exists() => {
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.to_string(),
                    source,
                })?;
                serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: p.to_string(),
                    source,
                })?
            }
            _ => Config::default(),
        };

        if config.schema_version > SCHEMA_VERSION {
            return Err(ConfigError::SchemaVersion(config.schema_version));
        }

        if let Some(port) = overrides.dns_port {
            config.server.dns_port = port;
        }
        if let Some(port) = overrides.web_port {
            config.server.web_port = port;
        }
        if let Some(host) = overrides.bind_host {
            config.server.bind_host = host;
        }

        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let text = serde_yaml::to_string(self).map_err(|e| {
            ConfigError::Invalid(format!("serialization failed: {e}"))
        })?;
        // Write-then-rename so a crash never leaves a torn config.
        let tmp = format!("{path}.tmp");
        std::fs::write(&tmp, text).map_err(|source| ConfigError::Write {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, path).map_err(|source| ConfigError::Write {
            path: path.to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .bind_host
            .parse::<std::net::IpAddr>()
            .map_err(|_| {
                ConfigError::Invalid(format!("bad bind_host: {}", self.server.bind_host))
            })?;

        UpstreamSets::parse(&self.dns.upstreams)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if !REFRESH_INTERVALS_HOURS.contains(&self.filtering.update_interval_hours) {
            return Err(ConfigError::Invalid(format!(
                "update_interval_hours must be one of {:?}",
                REFRESH_INTERVALS_HOURS
            )));
        }

        for rewrite in &self.filtering.rewrites {
            rewrite
                .parse_answer()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for client in &self.clients {
            if !names.insert(client.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate client name: {}",
                    client.name
                )));
            }
            for id in &client.ids {
                if !ids.insert(id.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "client id used twice: {id}"
                    )));
                }
            }
            client
                .parsed_ids()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        let mut urls = HashSet::new();
        for list in &self.filtering.filters {
            if !urls.insert((list.kind, list.url.as_str())) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate filter URL: {}",
                    list.url
                )));
            }
        }

        Ok(())
    }

    pub fn filters_dir(&self) -> std::path::PathBuf {
        Path::new(&self.data_dir).join("filters")
    }

    pub fn sessions_db_path(&self) -> std::path::PathBuf {
        Path::new(&self.data_dir).join("sessions.db")
    }

    pub fn querylog_path(&self) -> std::path::PathBuf {
        Path::new(&self.data_dir).join("querylog.jsonl")
    }
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_session_ttl() -> u64 {
    720
}

fn default_data_dir() -> String {
    "data".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_duplicate_client_id_rejected() {
        let mut config = Config::default();
        config.clients = vec![
            Client {
                name: "a".into(),
                ids: vec!["192.0.2.1".into()],
                tags: vec![],
                use_own_settings: false,
                filtering_enabled: true,
                safebrowsing_enabled: false,
                parental_enabled: false,
                safesearch_enabled: false,
                upstreams: vec![],
                use_own_blocked_services: false,
                blocked_services: vec![],
                whois_info: None,
            },
            Client {
                name: "b".into(),
                ids: vec!["192.0.2.1".into()],
                tags: vec![],
                use_own_settings: false,
                filtering_enabled: true,
                safebrowsing_enabled: false,
                parental_enabled: false,
                safesearch_enabled: false,
                upstreams: vec![],
                use_own_blocked_services: false,
                blocked_services: vec![],
                whois_info: None,
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_interval_rejected() {
        let mut config = Config::default();
        config.filtering.update_interval_hours = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let text = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back.schema_version, SCHEMA_VERSION);
        assert_eq!(back.dns.upstreams, config.dns.upstreams);
    }
}
