//! Configuration management for Roost

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub vault: VaultConfig,
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Shared-secret protecting the API surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub key: String,
}

/// Vault key configuration. The key is base64 and must decode to 32 bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: String,
    /// Handshake states older than this are invalid even if still stored.
    #[serde(default = "default_state_ttl_minutes")]
    pub state_ttl_minutes: u64,
}

/// Remote platform endpoints, overridable so tests can point at a stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            authorize_url: default_authorize_url(),
        }
    }
}

fn default_callback_url() -> String {
    "http://localhost:5555/auth/callback".to_string()
}

fn default_scopes() -> String {
    "tweet.read tweet.write users.read list.read list.write offline.access".to_string()
}

fn default_state_ttl_minutes() -> u64 {
    15
}

fn default_api_base() -> String {
    "https://api.twitter.com/2".to_string()
}

fn default_authorize_url() -> String {
    "https://twitter.com/i/oauth2/authorize".to_string()
}

impl Config {
    /// Load configuration from the default location, then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = Self::load_from_path(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Secret-bearing fields can come from the environment instead of the
    /// config file: `ROOST_API_KEY`, `ROOST_VAULT_KEY`, `ROOST_CLIENT_ID`,
    /// `ROOST_CLIENT_SECRET`, `ROOST_CALLBACK_URL`, `ROOST_DB_PATH`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ROOST_API_KEY") {
            self.api.key = v;
        }
        if let Ok(v) = std::env::var("ROOST_VAULT_KEY") {
            self.vault.key = v;
        }
        if let Ok(v) = std::env::var("ROOST_CLIENT_ID") {
            self.oauth.client_id = v;
        }
        if let Ok(v) = std::env::var("ROOST_CLIENT_SECRET") {
            self.oauth.client_secret = v;
        }
        if let Ok(v) = std::env::var("ROOST_CALLBACK_URL") {
            self.oauth.callback_url = v;
        }
        if let Ok(v) = std::env::var("ROOST_DB_PATH") {
            self.database.path = v;
        }
    }

    /// Validate that everything the core needs is present.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        if self.api.key.is_empty() {
            return Err(ConfigError::MissingField("api.key".to_string()).into());
        }
        if self.vault.key.is_empty() {
            return Err(ConfigError::MissingField("vault.key".to_string()).into());
        }
        if self.oauth.client_id.is_empty() {
            return Err(ConfigError::MissingField("oauth.client_id".to_string()).into());
        }
        if self.oauth.client_secret.is_empty() {
            return Err(ConfigError::MissingField("oauth.client_secret".to_string()).into());
        }
        Ok(())
    }

    /// Compare a presented API key against the configured one.
    ///
    /// Both sides are hashed before comparison so timing does not leak a
    /// prefix of the configured secret.
    pub fn verify_api_key(&self, presented: &str) -> bool {
        if self.api.key.is_empty() {
            return false;
        }
        let expected = Sha256::digest(self.api.key.as_bytes());
        let got = Sha256::digest(presented.as_bytes());
        expected == got
    }

    /// Create a default configuration skeleton for `roost-admin init`.
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/roost/roost.db".to_string(),
            },
            api: ApiConfig { key: String::new() },
            vault: VaultConfig { key: String::new() },
            oauth: OAuthConfig {
                client_id: String::new(),
                client_secret: String::new(),
                callback_url: default_callback_url(),
                scopes: default_scopes(),
                state_ttl_minutes: default_state_ttl_minutes(),
            },
            remote: RemoteConfig::default(),
        }
    }

    pub fn state_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.oauth.state_ttl_minutes as i64)
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("ROOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("roost").join("config.toml"))
}
