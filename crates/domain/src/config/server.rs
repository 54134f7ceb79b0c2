use serde::{Deserialize, Serialize};

/// Listener binding and ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    #[serde(default = "default_dns_port")]
    pub dns_port: u16,

    #[serde(default = "default_web_port")]
    pub web_port: u16,

    #[serde(default)]
    pub tls: TlsConfig,
}

/// Encrypted-listener settings. Certificate management itself is external;
/// the core only loads the referenced PEM files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_dot_port")]
    pub dot_port: u16,

    #[serde(default = "default_doq_port")]
    pub doq_port: u16,

    #[serde(default)]
    pub cert_file: Option<String>,

    #[serde(default)]
    pub key_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            dns_port: default_dns_port(),
            web_port: default_web_port(),
            tls: TlsConfig::default(),
        }
    }
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_dns_port() -> u16 {
    53
}

fn default_web_port() -> u16 {
    3000
}

fn default_dot_port() -> u16 {
    853
}

fn default_doq_port() -> u16 {
    853
}
