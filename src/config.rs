use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::token::TokenScheme;

/// Overrides `postgres_url` from the YAML file
pub const ENV_POSTGRES_URL: &str = "SIMPLE_BANK_POSTGRES_URL";
/// Overrides `token.symmetric_key` from the YAML file
pub const ENV_TOKEN_KEY: &str = "SIMPLE_BANK_TOKEN_KEY";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreBackend,
    /// PostgreSQL connection URL (required for the `postgres` store)
    #[serde(default)]
    pub postgres_url: Option<String>,
    pub token: TokenConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenConfig {
    #[serde(default)]
    pub scheme: TokenScheme,
    /// 32 bytes for PASETO, at least 32 bytes for JWT
    pub symmetric_key: String,
    #[serde(default = "default_access_token_duration_secs")]
    pub access_token_duration_secs: i64,
}

fn default_access_token_duration_secs() -> i64 {
    15 * 60
}

impl TokenConfig {
    pub fn access_token_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_duration_secs)
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`, then apply environment overrides
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_POSTGRES_URL) {
            self.postgres_url = Some(url);
        }
        if let Some(key) = lookup(ENV_TOKEN_KEY) {
            self.token.symmetric_key = key;
        }
    }
}
