//! Edit-session configuration.
//!
//! Values come from defaults, then an optional TOML file, then
//! `SCRIPTDESK_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::messages::Locale;

pub const ENV_LEASE_TTL_SECS: &str = "SCRIPTDESK_LEASE_TTL_SECS";
pub const ENV_LOCALE: &str = "SCRIPTDESK_LOCALE";
pub const ENV_DATABASE_PATH: &str = "SCRIPTDESK_DATABASE_PATH";

/// Longest accepted lease window.
pub const MAX_LEASE_TTL_SECS: u64 = 3_600;
pub const MAX_CACHE_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// Window after which a lease entry stops counting as an active editor.
    pub lease_ttl_secs: u64,
    /// Upper bound the cache accepts for an entry TTL.
    pub cache_max_ttl_secs: u64,
    pub version_retry_limit: u32,
    pub locale: Locale,
    pub database_path: Option<PathBuf>,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: 5,
            cache_max_ttl_secs: 300,
            version_retry_limit: 5,
            locale: Locale::En,
            database_path: None,
        }
    }
}

impl EditConfig {
    pub fn from_toml(content: &str) -> Result<Self, EngineError> {
        let config: Self =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
            Self::from_toml(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file missing, using defaults");
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), EngineError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. `apply_env` passes the process
    /// environment.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), EngineError> {
        if let Some(val) = lookup(ENV_LEASE_TTL_SECS) {
            self.lease_ttl_secs = val.trim().parse().map_err(|_| {
                EngineError::Config(format!("{ENV_LEASE_TTL_SECS}: expected seconds, got {val:?}"))
            })?;
        }
        if let Some(val) = lookup(ENV_LOCALE) {
            self.locale = Locale::parse(&val)
                .ok_or_else(|| EngineError::Config(format!("{ENV_LOCALE}: unknown locale {val:?}")))?;
        }
        if let Some(val) = lookup(ENV_DATABASE_PATH) {
            self.database_path = Some(PathBuf::from(val));
        }
        self.validate()
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    /// TTL given to cache entries: the lease TTL capped by the cache maximum.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs.min(self.cache_max_ttl_secs))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.lease_ttl_secs == 0 {
            return Err(EngineError::Config("lease_ttl_secs must be positive".into()));
        }
        if self.cache_max_ttl_secs == 0 {
            return Err(EngineError::Config("cache_max_ttl_secs must be positive".into()));
        }
        if self.lease_ttl_secs > MAX_LEASE_TTL_SECS {
            return Err(EngineError::Config(format!(
                "lease_ttl_secs must be at most {MAX_LEASE_TTL_SECS}"
            )));
        }
        if self.cache_max_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(EngineError::Config(format!(
                "cache_max_ttl_secs must be at most {MAX_CACHE_TTL_SECS}"
            )));
        }
        Ok(())
    }
}
