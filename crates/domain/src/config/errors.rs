use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Unsupported schema_version {0}")]
    SchemaVersion(u32),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
