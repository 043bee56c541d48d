use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Application configuration loaded from environment variables.
/// Nothing is strictly required: a missing Gemini key degrades feedback only.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_timeout: Duration,
    pub gemini_max_attempts: u32,
    pub embedding_model_dir: PathBuf,
    pub ner_model_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests never touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_attempts: u32 = parse_or(&lookup, "GEMINI_MAX_ATTEMPTS", 1)?;
        if max_attempts == 0 {
            anyhow::bail!("GEMINI_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Config {
            // An empty key is treated the same as an unset one.
            gemini_api_key: lookup("GEMINI_API_KEY")
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            gemini_model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: lookup("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            gemini_timeout: Duration::from_secs(parse_or(&lookup, "GEMINI_TIMEOUT_SECS", 120)?),
            gemini_max_attempts: max_attempts,
            embedding_model_dir: lookup("EMBEDDING_MODEL_DIR")
                .unwrap_or_else(|| "models/all-MiniLM-L6-v2".to_string())
                .into(),
            ner_model_dir: lookup("NER_MODEL_DIR")
                .unwrap_or_else(|| "models/bert-base-NER".to_string())
                .into(),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
