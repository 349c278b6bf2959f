//! Server configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `accredo.toml`, then `ACCREDO__*` environment variables (`__` separates
//! nested keys, e.g. `ACCREDO__RATE_LIMIT__MAX_REQUESTS`).

use accredo_chain::ChainConfig;
use accredo_core::{GovernanceParams, WalletAddress};
use accredo_registry::SuspensionPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::middleware::RateLimiterConfig;

const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,

    /// PostgreSQL URL; in-memory stores when absent
    pub database_url: Option<String>,

    /// HS256 secret for bearer tokens
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Expected `iss` claim
    pub jwt_issuer: String,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Admin accounts created at startup if missing
    pub bootstrap_admins: Vec<WalletAddress>,

    /// Initial governance parameters, used until an executed proposal
    /// replaces them
    pub governance: GovernanceParams,

    pub suspension_policy: SuspensionPolicy,

    pub rate_limit: RateLimitSettings,

    /// EVM role mirror; disabled when absent
    pub chain: Option<ChainConfig>,

    /// Adds HSTS to responses
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            database_url: None,
            jwt_secret: String::new(),
            jwt_issuer: "accredo".to_string(),
            cors_origins: vec!["*".to_string()],
            bootstrap_admins: Vec::new(),
            governance: GovernanceParams::default(),
            suspension_policy: SuspensionPolicy::default(),
            rate_limit: RateLimitSettings::default(),
            chain: None,
            production: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
            burst: 10,
        }
    }
}

impl From<&RateLimitSettings> for RateLimiterConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        RateLimiterConfig {
            max_requests: settings.max_requests,
            window: Duration::from_secs(settings.window_secs),
            burst: settings.burst,
        }
    }
}

impl ServerConfig {
    /// Load `.env`, `accredo.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load_from(None)
    }

    /// Load `.env`, then `path` (required) and the environment
    pub fn load_file(path: &str) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load_from(Some(path))
    }

    /// Like [`load`](Self::load) with an explicit config file, which must
    /// then exist
    pub fn load_from(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name("accredo").required(false),
        };

        let config: Self = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("ACCREDO")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_origins")
                    .with_list_parse_key("bootstrap_admins"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Message(format!(
                "jwt_secret must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }
        self.governance
            .validate()
            .map_err(|e| ConfigError::Message(format!("governance: {e}")))?;
        Ok(())
    }

    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig::from(&self.rate_limit)
    }
}
