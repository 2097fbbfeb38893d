use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::transcription::orchestrator::{OrchestratorConfig, DEFAULT_POLL_INTERVAL_SECS};
use crate::transcription::{ModelTier, RetryPolicy};

pub const APP_CONFIG_DIR: &str = "interview-transcript";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the pipeline reads from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Skips model discovery when set.
    pub primary_model: Option<String>,
    pub tier: ModelTier,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub poll_timeout: Option<Duration>,
    pub bypass_model_cache: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            openai_api_key: None,
            primary_model: None,
            tier: ModelTier::Pro,
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_timeout: None,
            bypass_model_cache: false,
        }
    }
}

impl PipelineConfig {
    /// Load `.env` files, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_attempts = match parsed::<u32, _>(&lookup, "TRANSCRIBE_MAX_ATTEMPTS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "TRANSCRIBE_MAX_ATTEMPTS",
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                })
            }
            Some(attempts) => attempts,
            None => defaults.retry.max_attempts,
        };
        let base_delay = parsed::<u64, _>(&lookup, "TRANSCRIBE_BASE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.base_delay);
        let poll_interval = parsed::<u64, _>(&lookup, "TRANSCRIBE_POLL_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);
        let poll_timeout = parsed::<u64, _>(&lookup, "TRANSCRIBE_POLL_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .or(defaults.poll_timeout);
        let bypass_model_cache = match non_empty(&lookup, "TRANSCRIBE_BYPASS_MODEL_CACHE") {
            Some(flag) => parse_flag("TRANSCRIBE_BYPASS_MODEL_CACHE", &flag)?,
            None => defaults.bypass_model_cache,
        };

        Ok(Self {
            gemini_api_key: api_key(&lookup, "GEMINI_API_KEY")
                .or_else(|| api_key(&lookup, "GOOGLE_API_KEY")),
            openai_api_key: api_key(&lookup, "OPENAI_API_KEY"),
            primary_model: non_empty(&lookup, "TRANSCRIBE_PRIMARY_MODEL"),
            retry: RetryPolicy {
                max_attempts,
                base_delay,
                ..defaults.retry.clone()
            },
            poll_interval,
            poll_timeout,
            bypass_model_cache,
            ..defaults
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            retry: self.retry.clone(),
            poll_interval: self.poll_interval,
            poll_timeout: self.poll_timeout,
            tier: self.tier,
        }
    }
}

/// `.env` in the working directory first, then the per-user config directory.
/// Variables already set in the process win.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) => debug!("No .env in working directory: {}", e),
    }
    if let Some(path) = user_env_file() {
        if path.exists() {
            match dotenvy::from_path(&path) {
                Ok(()) => debug!("Loaded environment from {}", path.display()),
                Err(e) => debug!("Could not load {}: {}", path.display(), e),
            }
        }
    }
}

pub fn user_env_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_CONFIG_DIR).join(".env"))
}

/// Keys are often pasted with quotes or trailing newlines.
fn clean_key(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').trim().to_string()
}

fn api_key<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<String> {
    lookup(key).map(|v| clean_key(&v)).filter(|v| !v.is_empty())
}

fn non_empty<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key) {
        None => Ok(None),
        Some(value) => value.parse::<T>().map(Some).map_err(|e| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
