//! Server configuration.
//!
//! Loaded once at startup from a TOML file (path in the
//! `GATEHOUSE_CONFIG` env var, default `gatehouse.toml`) with env
//! overrides for the server address and database path. Identity
//! provider credentials live only here, never in the database; the
//! mutable policy knobs (login switch, provider enablement, token
//! lifetimes) live in storage and are served by the settings cache.

use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::providers::ProviderConfig;

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Identity providers to register at startup.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "data/gatehouse.db".to_string()
}

/// Load configuration and install the global instance.
pub fn init() -> Result<&'static Config> {
    dotenvy::dotenv().ok();

    let path =
        std::env::var("GATEHOUSE_CONFIG").unwrap_or_else(|_| "gatehouse.toml".to_string());

    let mut config = if std::path::Path::new(&path).exists() {
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::ConfigMapping(format!("Cannot read {}: {}", path, e)))?;
        toml::from_str(&raw)
            .map_err(|e| Error::ConfigMapping(format!("Cannot parse {}: {}", path, e)))?
    } else {
        Config::default()
    };

    if let Ok(host) = std::env::var("GATEHOUSE_HOST") {
        config.server.host = host;
    }
    if let Ok(port) = std::env::var("GATEHOUSE_PORT") {
        config.server.port = port
            .parse()
            .map_err(|e| Error::ConfigMapping(format!("Bad GATEHOUSE_PORT: {}", e)))?;
    }
    if let Ok(db) = std::env::var("GATEHOUSE_DB") {
        config.database.path = db;
    }

    Ok(CONFIG.get_or_init(|| config))
}

/// The global configuration. Panics if [`init`] has not run.
pub fn config() -> &'static Config {
    CONFIG.get().expect("config not initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "data/gatehouse.db");
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_parse_with_provider() {
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 9090

            [database]
            path = ":memory:"

            [[providers]]
            name = "Globus"
            login_base_url = "https://auth.globus.org"
            api_base_url = "https://auth.globus.org"
            client_id = "cid"
            client_secret = "csecret"
            image_uri = "/img/globus.png"
            login_redirect_url = "https://my.server/login/complete"
            link_redirect_url = "https://my.server/link/complete"

            [providers.custom]
            ignore-secondary-identities = "true"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.providers.len(), 1);
        let provider = &config.providers[0];
        assert_eq!(provider.name, "Globus");
        assert!(provider.custom_flag("ignore-secondary-identities"));
    }
}
