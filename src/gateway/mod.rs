//! Provider gateway for OpenRouter chat completions.

pub mod error;
pub mod openrouter;
pub mod types;

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::Settings;
use openrouter::{ChatProvider, OpenRouterAdapter};

pub use error::{ErrorContext, ProviderError};
pub use types::*;

/// The injected model client every pipeline receives.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

pub struct ProviderGateway {
    openrouter: OpenRouterAdapter,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl ChatGateway for ProviderGateway {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }
}

impl ProviderGateway {
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::from_settings(&Settings::from_env())
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let openrouter = OpenRouterAdapter::from_settings(settings)?;
        Ok(Self::with_config(
            openrouter,
            GatewayConfig {
                max_retries: settings.max_retries,
                ..GatewayConfig::default()
            },
        ))
    }

    pub fn with_config(openrouter: OpenRouterAdapter, config: GatewayConfig) -> Self {
        Self { openrouter, config }
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.openrouter.chat(&req).await {
                Ok(resp) => {
                    debug!(
                        caller = req.attribution.caller,
                        run_id = ?req.attribution.run_id,
                        model = req.model.model_id(),
                        input_tokens = resp.input_tokens,
                        output_tokens = resp.output_tokens,
                        latency_ms = resp.latency.as_millis() as u64,
                        "provider call succeeded"
                    );
                    return Ok(resp);
                }
                Err(err) => {
                    warn!(
                        caller = req.attribution.caller,
                        run_id = ?req.attribution.run_id,
                        model = req.model.model_id(),
                        attempt,
                        code = err.code(),
                        error = %err,
                        "provider call failed"
                    );

                    if !err.is_retryable() || attempt == self.config.max_retries {
                        return Err(err);
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    last_error = Some(err);
                    sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::malformed("retry loop made no attempt")))
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.pow(attempt.min(5));
    base * multiplier
}
