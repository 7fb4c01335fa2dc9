//! Runtime configuration, resolved from the environment.

use std::env;

use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "google/gemini-2.5-pro-preview";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OPENROUTER_API_KEY is not set")]
    MissingApiKey,
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Connection settings for the mapping oracle.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OracleConfig {
    /// Resolve from `OPENROUTER_API_KEY`, `FORMFILL_BASE_URL`,
    /// `FORMFILL_MODEL` and `FORMFILL_ORACLE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        let base_url =
            env::var("FORMFILL_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = env::var("FORMFILL_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout_secs = match env::var("FORMFILL_ORACLE_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "FORMFILL_ORACLE_TIMEOUT_SECS",
                value: raw,
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };
        Ok(Self { base_url, api_key, model, timeout_secs })
    }
}
