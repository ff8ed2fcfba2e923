//! Configuration for the factory binary.
//!
//! Non-secret settings live in `~/.config/architect/factory.toml`; secrets
//! come from the command line or the environment and are never written to
//! disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::DEFAULT_CYCLE_DELAY;
use crate::error::{Error, Result};
use crate::llm::{DEFAULT_COMPLETION_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TIMEOUT};

/// Settings file contents. Every field is optional; unset means default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Chat model name. Default: gpt-4
    pub model: Option<String>,
    /// Chat-completions endpoint.
    pub completion_url: Option<String>,
    /// Per-request wait ceiling for completions, in seconds.
    pub completion_timeout_secs: Option<u64>,
    /// `max_tokens` sent with every completion. Default: 4000
    pub max_tokens: Option<u32>,
    /// Override for the record store base URL (self-hosted gateways).
    pub store_url: Option<String>,
    /// Pause between cycles, in seconds. Default: 10
    pub cycle_delay_secs: Option<u64>,
    /// Optional budget for a whole cycle, in seconds.
    pub cycle_timeout_secs: Option<u64>,
    /// SQLite file for records the remote store refused.
    pub fallback_db: Option<PathBuf>,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("architect")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("factory.toml")
}

pub fn default_fallback_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("architect")
        .join("fallback.db")
}

impl FileConfig {
    /// Load from `path`. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Validation(format!("can't read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
            .map_err(|e| Error::Validation(format!("bad config file {}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Validation(e.to_string()))
    }

    /// Values set in `over` win over values set in `self`.
    pub fn overlay(self, over: FileConfig) -> Self {
        Self {
            model: over.model.or(self.model),
            completion_url: over.completion_url.or(self.completion_url),
            completion_timeout_secs: over.completion_timeout_secs.or(self.completion_timeout_secs),
            max_tokens: over.max_tokens.or(self.max_tokens),
            store_url: over.store_url.or(self.store_url),
            cycle_delay_secs: over.cycle_delay_secs.or(self.cycle_delay_secs),
            cycle_timeout_secs: over.cycle_timeout_secs.or(self.cycle_timeout_secs),
            fallback_db: over.fallback_db.or(self.fallback_db),
        }
    }
}

/// Resolved, validated settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: String,
    pub completion_url: String,
    pub completion_timeout: Duration,
    pub max_tokens: u32,
    pub store_url: Option<String>,
    pub cycle_delay: Duration,
    pub cycle_timeout: Option<Duration>,
    pub fallback_db: PathBuf,
}

fn positive_secs(value: Option<u64>, what: &str) -> Result<Option<Duration>> {
    match value {
        Some(0) => Err(Error::Validation(format!("{what} must be greater than zero"))),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

fn non_empty(value: Option<String>, what: &str) -> Result<Option<String>> {
    match value {
        Some(v) if v.trim().is_empty() => {
            Err(Error::Validation(format!("{what} must not be empty")))
        }
        Some(v) => Ok(Some(v.trim().to_string())),
        None => Ok(None),
    }
}

impl Settings {
    pub fn resolve(file: FileConfig) -> Result<Self> {
        let max_tokens = file.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if max_tokens == 0 {
            return Err(Error::Validation("max_tokens must be greater than zero".into()));
        }
        Ok(Self {
            model: non_empty(file.model, "model")?.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            completion_url: non_empty(file.completion_url, "completion_url")?
                .unwrap_or_else(|| DEFAULT_COMPLETION_URL.to_string()),
            completion_timeout: positive_secs(
                file.completion_timeout_secs,
                "completion_timeout_secs",
            )?
            .unwrap_or(DEFAULT_TIMEOUT),
            max_tokens,
            store_url: non_empty(file.store_url, "store_url")?,
            cycle_delay: file
                .cycle_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CYCLE_DELAY),
            cycle_timeout: positive_secs(file.cycle_timeout_secs, "cycle_timeout_secs")?,
            fallback_db: file.fallback_db.unwrap_or_else(default_fallback_path),
        })
    }
}

/// Secrets for the two remote backends.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_key: Option<String>,
    pub cf_account_id: Option<String>,
    pub cf_api_token: Option<String>,
    pub cf_database_id: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("openai_key", &mask(&self.openai_key))
            .field("cf_account_id", &self.cf_account_id)
            .field("cf_api_token", &mask(&self.cf_api_token))
            .field("cf_database_id", &self.cf_database_id)
            .finish()
    }
}

fn present<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Validation(format!("{what} is required"))),
    }
}

/// Trimmed store credentials, in constructor order.
pub struct StoreCredentials<'a> {
    pub account_id: &'a str,
    pub api_token: &'a str,
    pub database_id: &'a str,
}

impl Credentials {
    pub fn completion_key(&self) -> Result<&str> {
        present(&self.openai_key, "OpenAI API key")
    }

    pub fn store(&self) -> Result<StoreCredentials<'_>> {
        Ok(StoreCredentials {
            account_id: present(&self.cf_account_id, "Cloudflare Account ID")?,
            api_token: present(&self.cf_api_token, "Cloudflare API Token")?,
            database_id: present(&self.cf_database_id, "Cloudflare Database ID")?,
        })
    }
}
