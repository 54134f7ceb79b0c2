use warden_dns_domain::{CliOverrides, Config, ConfigError};

pub fn load_config(path: &str, overrides: CliOverrides) -> Result<Config, ConfigError> {
    let config = Config::load(Some(path), overrides)?;
    config.validate()?;
    Ok(config)
}
