//! Configuration management for the widget client.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use validator::Validate;

use crate::{Error, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Validate)]
pub struct Config {
    /// Base URL of the support backend
    #[validate(url)]
    pub backend_url: String,
    /// API key identifying the business
    #[validate(length(min = 1))]
    pub api_key: String,
    /// Business id; resolved from the API key when absent
    pub business_id: Option<String>,
    /// Optional bearer token for authenticated endpoints
    pub bearer_token: Option<String>,
    /// Directory holding the persisted cookie jar
    pub state_dir: Option<PathBuf>,
    /// Business id to fall back to when the backend is unreachable
    pub demo_business_id: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let timeout_secs = match env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("REQUEST_TIMEOUT_SECS: {}", e)))?,
            Err(_) => 30,
        };

        let config = Self {
            backend_url: env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            api_key: env::var("WIDGET_API_KEY")
                .map_err(|_| Error::Config("WIDGET_API_KEY not set".to_string()))?,
            business_id: non_empty_var("WIDGET_BUSINESS_ID"),
            bearer_token: non_empty_var("WIDGET_BEARER_TOKEN"),
            state_dir: non_empty_var("WIDGET_STATE_DIR").map(PathBuf::from),
            demo_business_id: non_empty_var("WIDGET_DEMO_BUSINESS_ID"),
            request_timeout: Duration::from_secs(timeout_secs),
        };

        config
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;

        Ok(config)
    }

    /// Where the cookie jar lives, falling back to the platform data dir.
    pub fn cookie_path(&self) -> Result<PathBuf> {
        let dir = match &self.state_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()
                .map(|p| p.join("support-widget"))
                .ok_or_else(|| Error::Config("Could not find data directory".to_string()))?,
        };
        Ok(dir.join("cookies.json"))
    }

    /// API key shortened for log output.
    pub fn redacted_api_key(&self) -> String {
        redact(&self.api_key)
    }
}

/// First five characters followed by an ellipsis.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(5).collect();
    format!("{}...", prefix)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Fixed delays used purely for UI feedback.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Loading placeholder moves to `processing` after this delay
    pub processing_after: Duration,
    /// Loading placeholder moves to `analyzing` after this delay
    pub analyzing_after: Duration,
    /// Stagger before the personalization metadata line
    pub metadata_delay: Duration,
    /// Stagger before the demo-mode system note
    pub demo_note_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            processing_after: Duration::from_secs(2),
            analyzing_after: Duration::from_secs(4),
            metadata_delay: Duration::from_millis(500),
            demo_note_delay: Duration::from_millis(500),
        }
    }
}

impl Timings {
    /// Default stage timers with no render staggering.
    pub fn without_stagger() -> Self {
        Self {
            metadata_delay: Duration::ZERO,
            demo_note_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}
