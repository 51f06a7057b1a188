//! Failures of a single model call.
//!
//! Flows surface every one of these as `InvokeError::Provider`. The variants
//! exist for the gateway's retry decision and for the `code` on log lines.

use std::time::Duration;

use thiserror::Error;

/// What the provider told us about a failed call, when it told us anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub http_status: Option<u16>,
    /// `error.code` from the body; numeric codes are kept as text.
    pub provider_code: Option<String>,
    /// `x-request-id` response header.
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 429.
    #[error("rate limited by provider, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        context: ErrorContext,
    },

    /// The provider answered with an error status or an `error` object.
    #[error("{source_name} rejected the call: {message}")]
    Upstream {
        source_name: &'static str,
        message: String,
        retryable: bool,
        context: ErrorContext,
    },

    /// A success status whose body holds no usable completion.
    #[error("malformed completion: {0}")]
    Malformed(String),

    /// Stopped locally before anything was sent, e.g. an oversized prompt.
    #[error("request not sent: {0}")]
    NotSent(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Missing or unusable credential.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn rate_limited(retry_after: Duration, context: ErrorContext) -> Self {
        Self::RateLimited {
            retry_after,
            context,
        }
    }

    pub fn upstream(
        source_name: &'static str,
        message: impl Into<String>,
        retryable: bool,
        context: ErrorContext,
    ) -> Self {
        Self::Upstream {
            source_name,
            message: message.into(),
            retryable,
            context,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn not_sent(message: impl Into<String>) -> Self {
        Self::NotSent(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// 429s, 5xx and connect/timeout failures. Everything else repeats if resent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Upstream { retryable, .. } => *retryable,
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Malformed(_) | Self::NotSent(_) | Self::Config(_) => false,
        }
    }

    /// Stable label for the `code` field of gateway logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Upstream { .. } => "upstream",
            Self::Malformed(_) => "malformed",
            Self::NotSent(_) => "not_sent",
            Self::Transport(e) if e.is_timeout() => "timeout",
            Self::Transport(_) => "transport",
            Self::Config(_) => "config_error",
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::RateLimited { context, .. } | Self::Upstream { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_is_permanent() {
        let err = ProviderError::config("OPENROUTER_API_KEY not set");
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "config_error");
        assert_eq!(
            err.to_string(),
            "configuration error: OPENROUTER_API_KEY not set"
        );
        assert!(err.context().is_none());
    }

    #[test]
    fn upstream_5xx_is_retryable_and_keeps_context() {
        let ctx = ErrorContext::new().with_status(503).with_request_id("req-1");
        let err = ProviderError::upstream("openrouter", "overloaded", true, ctx);
        assert!(err.is_retryable());
        assert_eq!(err.code(), "upstream");
        assert_eq!(err.request_id(), Some("req-1"));
        assert_eq!(err.context().and_then(|c| c.http_status), Some(503));
        assert_eq!(err.to_string(), "openrouter rejected the call: overloaded");
    }

    #[test]
    fn local_failures_are_not_retried() {
        assert!(!ProviderError::malformed("no choices").is_retryable());
        assert!(!ProviderError::not_sent("too large").is_retryable());
        assert_eq!(ProviderError::not_sent("too large").code(), "not_sent");
    }
}
