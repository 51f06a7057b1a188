//! Request and reply types exchanged with the model client.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which prompt issued a call and which pipeline run it belongs to.
///
/// `caller` is the prompt slug (`route_query`, `refine_critique`, ...) or
/// `generate` for plain drafts. Both fields end up on every gateway log line.
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    pub caller: &'static str,
    pub run_id: Option<Uuid>,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            run_id: None,
        }
    }

    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// Pipelines only ever send instructions and the rendered request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Provider-side model identifier, e.g. `google/gemini-2.0-flash-001`.
///
/// Caller-supplied names from `modelNames` pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatModel(String);

impl ChatModel {
    pub fn openrouter(model_id: impl Into<String>) -> Self {
        Self(model_id.into())
    }

    pub fn model_id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One completion call. Structured prompts set `json_mode`; drafts leave it off.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: ChatModel,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    pub attribution: Attribution,
}

impl ChatRequest {
    pub fn new(model: ChatModel, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model,
            messages,
            temperature: 0.0,
            max_tokens: None,
            json_mode: false,
            attribution,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// What came back from a successful call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency: Duration,
    /// The provider stopped at `max_tokens` rather than at a natural end.
    pub truncated: bool,
}

impl ChatResponse {
    /// Text-only reply with zeroed usage.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            input_tokens: 0,
            output_tokens: 0,
            latency: Duration::ZERO,
            truncated: false,
        }
    }

    /// Maps an OpenAI-style `finish_reason` onto [`truncated`](Self::truncated).
    pub fn stopped_at_limit(finish_reason: Option<&str>) -> bool {
        finish_reason == Some("length")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_is_plain_text_at_zero_temperature() {
        let req = ChatRequest::new(
            ChatModel::openrouter("google/gemini-2.0-flash-001"),
            vec![Message::user("hi")],
            Attribution::new("generate"),
        );

        assert_eq!(req.temperature, 0.0);
        assert!(req.max_tokens.is_none());
        assert!(!req.json_mode);
        assert!(req.attribution.run_id.is_none());
        assert_eq!(req.model.to_string(), "google/gemini-2.0-flash-001");
    }

    #[test]
    fn structured_request_carries_run_and_limits() {
        let run_id = Uuid::new_v4();
        let req = ChatRequest::new(
            ChatModel::openrouter("test/model"),
            vec![Message::system("s"), Message::user("u")],
            Attribution::new("route_query").with_run(run_id),
        )
        .temperature(0.7)
        .max_tokens(256)
        .json();

        assert!(req.json_mode);
        assert_eq!(req.max_tokens, Some(256));
        assert_eq!(req.attribution.run_id, Some(run_id));
        assert_eq!(req.messages[0].role.as_str(), "system");
    }

    #[test]
    fn only_length_counts_as_truncation() {
        assert!(ChatResponse::stopped_at_limit(Some("length")));
        assert!(!ChatResponse::stopped_at_limit(Some("stop")));
        assert!(!ChatResponse::stopped_at_limit(Some("tool_calls")));
        assert!(!ChatResponse::stopped_at_limit(None));
        assert!(!ChatResponse::text("x").truncated);
    }
}
