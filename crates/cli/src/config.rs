use anyhow::Context;
use marketd_api::ServerConfig;
use marketd_core::{ClientOverrides, ConfigError, Credentials};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Contents of `marketd.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Named credential sets, e.g. `[exchanges.binance_future_testnet]`.
    pub exchanges: BTreeMap<String, ExchangeSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSection {
    pub api_key: String,
    pub secret: String,
    #[serde(default)]
    pub sandbox: bool,
}

impl AppConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Config file not found: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Client overrides for the named credentials section.
    pub fn overrides(&self, section: &str) -> Result<ClientOverrides, ConfigError> {
        let entry = self
            .exchanges
            .get(section)
            .ok_or_else(|| ConfigError::MissingSection(section.to_string()))?;
        Ok(ClientOverrides {
            credentials: Some(Credentials {
                api_key: entry.api_key.clone(),
                secret: entry.secret.clone(),
            }),
            sandbox: Some(entry.sandbox),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.server, ServerConfig::default());
        assert!(config.exchanges.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::parse(
            r#"
            [server]
            port = 6000
            max_workers = 4
            shutdown_grace_period_ms = 1000
            admin_bind = "127.0.0.1:8080"

            [exchanges.binance_future_testnet]
            api_key = "key"
            secret = "secret"
            sandbox = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.max_workers, 4);
        assert_eq!(config.server.admin_bind.as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(config.server.keepalive_time_ms, 30_000);

        let overrides = config.overrides("binance_future_testnet").unwrap();
        assert_eq!(overrides.sandbox, Some(true));
        assert_eq!(overrides.credentials.unwrap().api_key, "key");
    }

    #[test]
    fn test_missing_section() {
        let config = AppConfig::default();
        let err = config.overrides("binance").unwrap_err();
        assert_eq!(err, ConfigError::MissingSection("binance".into()));
        assert_eq!(err.to_string(), "Section binance not found in config file");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(AppConfig::parse("[server]\nport = \"not a number\"").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_or_default(Path::new("/nonexistent/marketd.toml")).unwrap();
        assert_eq!(config.server.port, 50051);
        assert!(AppConfig::load(Path::new("/nonexistent/marketd.toml")).is_err());
    }
}
