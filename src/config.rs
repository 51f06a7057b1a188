//! Process-wide settings, read once from the environment at startup.

use std::time::Duration;

use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider credential, endpoint and default model.
///
/// A missing credential is not fatal here: the gateway built from these
/// settings fails on first use instead.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub referer: Option<String>,
    pub app_title: Option<String>,
    /// Model used by every call that does not name one.
    pub default_model: String,
    /// Transport-level retries. Zero means failures surface immediately.
    pub max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            referer: None,
            app_title: None,
            default_model: DEFAULT_MODEL.to_string(),
            max_retries: 0,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("OPENROUTER_API_KEY");
        if api_key.is_none() {
            warn!(
                "OPENROUTER_API_KEY is not set; model calls will fail until it is configured"
            );
        }

        let timeout = non_empty("OPENROUTER_TIMEOUT_SECONDS")
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let max_retries = non_empty("COGFLOW_MAX_RETRIES")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);

        Self {
            api_key,
            base_url: non_empty("OPENROUTER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            timeout,
            referer: non_empty("OPENROUTER_REFERER"),
            app_title: non_empty("OPENROUTER_APP_TITLE"),
            default_model: non_empty("COGFLOW_DEFAULT_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.into()),
            max_retries,
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}
