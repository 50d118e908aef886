//! Runtime configuration
//!
//! Read once from the environment (after `.env` is loaded by the binary).
//! Clients receive their settings from here and never touch the environment.

use crate::error::AgentError;
use crate::Result;
use std::env;
use std::time::Duration;

pub const DEFAULT_FMP_BASE_URL: &str = "https://financialmodelingprep.com";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

const DEFAULT_FMP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GEMINI_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
const MAX_OUTPUT_TOKENS_LIMIT: u32 = 8192;

#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: String,
    pub fmp_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub fmp_base_url: String,
    pub fmp_timeout: Duration,
    pub gemini_timeout: Duration,
    pub max_output_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_api_key: String::new(),
            fmp_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            fmp_base_url: DEFAULT_FMP_BASE_URL.to_string(),
            fmp_timeout: Duration::from_secs(DEFAULT_FMP_TIMEOUT_SECS),
            gemini_timeout: Duration::from_secs(DEFAULT_GEMINI_TIMEOUT_SECS),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

impl Config {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let google_api_key = var("GOOGLE_API_KEY")
            .or_else(|| var("GEMINI_API_KEY"))
            .unwrap_or_default();

        let fmp_api_key = var("FMP_API_KEY").unwrap_or_default();

        let fmp_timeout = match var("FMP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("FMP_TIMEOUT_SECS", &raw)?),
            None => defaults.fmp_timeout,
        };

        let gemini_timeout = match var("GEMINI_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("GEMINI_TIMEOUT_SECS", &raw)?),
            None => defaults.gemini_timeout,
        };

        let max_output_tokens = match var("GEMINI_MAX_OUTPUT_TOKENS") {
            Some(raw) => parse_number("GEMINI_MAX_OUTPUT_TOKENS", &raw)?,
            None => defaults.max_output_tokens,
        };

        Ok(Self {
            google_api_key,
            fmp_api_key,
            gemini_model: var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: var("GEMINI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_base_url),
            fmp_base_url: var("FMP_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.fmp_base_url),
            fmp_timeout,
            gemini_timeout,
            max_output_tokens,
        })
    }

    /// Check credentials and bounds before any request is made
    pub fn validate(&self) -> Result<()> {
        check_credential("FMP_API_KEY", &self.fmp_api_key)?;
        check_credential("GOOGLE_API_KEY", &self.google_api_key)?;

        for (name, url) in [
            ("FMP_BASE_URL", &self.fmp_base_url),
            ("GEMINI_BASE_URL", &self.gemini_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AgentError::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }

        if self.gemini_model.trim().is_empty() || self.gemini_model.contains('/') {
            return Err(AgentError::Config(format!(
                "GEMINI_MODEL '{}' is not a valid model name",
                self.gemini_model
            )));
        }

        if self.fmp_timeout.is_zero() || self.gemini_timeout.is_zero() {
            return Err(AgentError::Config(
                "Request timeouts must be at least one second".to_string(),
            ));
        }

        if self.max_output_tokens == 0 || self.max_output_tokens > MAX_OUTPUT_TOKENS_LIMIT {
            return Err(AgentError::Config(format!(
                "GEMINI_MAX_OUTPUT_TOKENS must be between 1 and {}",
                MAX_OUTPUT_TOKENS_LIMIT
            )));
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        AgentError::Config(format!("{} must be a positive integer, got '{}'", name, raw))
    })
}

/// Reject empty keys and unedited template placeholders like `{FMP_API_KEY}`
pub fn check_credential(name: &str, value: &str) -> Result<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(AgentError::Config(format!(
            "{} is not set. Export it or add it to your .env file",
            name
        )));
    }

    if is_placeholder(value) {
        return Err(AgentError::Config(format!(
            "{} still holds the placeholder '{}'. Replace it with a real key",
            name, value
        )));
    }

    Ok(())
}

fn is_placeholder(value: &str) -> bool {
    let lowered = value.to_lowercase();

    (value.starts_with('{') && value.ends_with('}'))
        || (value.starts_with('<') && value.ends_with('>'))
        || (lowered.starts_with("your_") && lowered.ends_with("_here"))
        || lowered.contains("api_key_here")
        || value.contains("${")
}
