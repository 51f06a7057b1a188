//! Structured invocation: one model call in, one typed value (or an explicit failure) out.
//!
//! This is the only layer that talks to the gateway. It renders a prompt,
//! tells the model what JSON to produce, and checks the reply against the
//! declared [`Shape`]. It never retries and never caches.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::Settings;
use crate::gateway::{
    Attribution, ChatGateway, ChatModel, ChatRequest, Message, ProviderError, ProviderGateway,
};
use crate::prompts::{PromptTemplate, Vars};
use crate::schema::{validate_output, SchemaViolation, Shape};

const DEFAULT_TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    #[error("no structured output from {prompt}: {reason}")]
    NoStructuredOutput { prompt: &'static str, reason: String },

    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),
}

// =============================================================================
// Request / result
// =============================================================================

/// One structured call: template, bindings, and the shape the reply must take.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub template: PromptTemplate,
    pub vars: Vars,
    pub shape: &'static Shape,
    /// Falls back to the invoker's default model.
    pub model: Option<String>,
    pub temperature: f32,
    pub run_id: Option<Uuid>,
}

impl InvocationRequest {
    pub fn new(template: PromptTemplate, vars: Vars, shape: &'static Shape) -> Self {
        Self {
            template,
            vars,
            shape,
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            run_id: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// Reply of one structured call.
///
/// `parsed` is present only when the reply conformed to the shape. When it is
/// absent, `absence` says why.
#[derive(Debug, Clone)]
pub struct InvocationResult<T> {
    pub prompt: &'static str,
    pub raw_text: String,
    pub parsed: Option<T>,
    pub absence: Option<String>,
}

impl<T> InvocationResult<T> {
    /// The parsed value, or `NoStructuredOutput`.
    pub fn require(self) -> Result<T, InvokeError> {
        match self.parsed {
            Some(value) => Ok(value),
            None => Err(InvokeError::NoStructuredOutput {
                prompt: self.prompt,
                reason: self
                    .absence
                    .unwrap_or_else(|| "reply did not contain a structured value".into()),
            }),
        }
    }
}

// =============================================================================
// Invoker
// =============================================================================

/// Issues structured and plain calls through an injected gateway.
#[derive(Clone)]
pub struct Invoker {
    gateway: Arc<dyn ChatGateway>,
    default_model: String,
}

impl Invoker {
    pub fn new(gateway: Arc<dyn ChatGateway>, default_model: impl Into<String>) -> Self {
        Self {
            gateway,
            default_model: default_model.into(),
        }
    }

    /// OpenRouter-backed invoker. Succeeds without a credential; calls fail later.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let gateway = ProviderGateway::from_settings(settings)?;
        Ok(Self::new(Arc::new(gateway), settings.default_model.clone()))
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub async fn invoke<T: DeserializeOwned>(
        &self,
        req: InvocationRequest,
    ) -> Result<InvocationResult<T>, InvokeError> {
        let instance = req.template.render(&req.vars);
        let mut messages = instance.to_messages();
        let contract = req.shape.describe();
        if instance.system.is_some() {
            if let Some(system) = messages.first_mut() {
                system.content.push_str("\n\n");
                system.content.push_str(&contract);
            }
        } else {
            messages.insert(0, Message::system(contract));
        }

        let model = req.model.as_deref().unwrap_or(&self.default_model);
        let mut attribution = Attribution::new(req.template.slug);
        if let Some(run_id) = req.run_id {
            attribution = attribution.with_run(run_id);
        }

        let chat = ChatRequest::new(ChatModel::openrouter(model), messages, attribution)
            .temperature(req.temperature)
            .max_tokens(MAX_TOKENS)
            .json();

        let resp = self.gateway.chat(chat).await?;
        let truncated = resp.truncated;
        let raw_text = resp.content;

        let (parsed, absence) = match parse_reply::<T>(req.shape, &raw_text)? {
            Ok(value) => (Some(value), None),
            Err(reason) => {
                let reason = if truncated {
                    format!("{reason} (reply cut off at {MAX_TOKENS} tokens)")
                } else {
                    reason
                };
                let preview: String = raw_text.chars().take(200).collect();
                debug!(
                    prompt = req.template.slug,
                    model,
                    reason = %reason,
                    preview = %preview,
                    "reply carried no structured value"
                );
                (None, Some(reason))
            }
        };

        Ok(InvocationResult {
            prompt: req.template.slug,
            raw_text,
            parsed,
            absence,
        })
    }

    /// [`invoke`](Self::invoke) then [`require`](InvocationResult::require).
    pub async fn invoke_required<T: DeserializeOwned>(
        &self,
        req: InvocationRequest,
    ) -> Result<T, InvokeError> {
        self.invoke(req).await?.require()
    }

    /// Plain text generation with no output contract.
    pub async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
        run_id: Option<Uuid>,
    ) -> Result<String, InvokeError> {
        let model = model.unwrap_or(&self.default_model);
        let mut attribution = Attribution::new("generate");
        if let Some(run_id) = run_id {
            attribution = attribution.with_run(run_id);
        }

        let chat = ChatRequest::new(
            ChatModel::openrouter(model),
            vec![Message::user(prompt)],
            attribution,
        )
        .temperature(DEFAULT_TEMPERATURE)
        .max_tokens(MAX_TOKENS);

        let resp = self.gateway.chat(chat).await?;
        if resp.content.trim().is_empty() {
            return Err(InvokeError::NoStructuredOutput {
                prompt: "generate",
                reason: format!("{model} returned blank text"),
            });
        }
        Ok(resp.content)
    }
}

/// Outer `Err` is a hard schema violation; inner `Err` is a reason the reply
/// holds nothing usable.
fn parse_reply<T: DeserializeOwned>(
    shape: &'static Shape,
    raw: &str,
) -> Result<Result<T, String>, SchemaViolation> {
    if raw.trim().is_empty() {
        return Ok(Err("reply was empty".into()));
    }

    let value: Value = match serde_json::from_str(extract_json(raw)) {
        Ok(v) => v,
        Err(e) => return Ok(Err(format!("reply was not JSON: {e}"))),
    };
    if !value.is_object() {
        return Ok(Err("reply was not a JSON object".into()));
    }

    match shape.validate(&value) {
        Ok(()) => validate_output(shape, &value).map(Ok),
        Err(v) if v.is_absence() => Ok(Err(v.to_string())),
        Err(v) => Err(v),
    }
}

/// Slice the first balanced JSON object out of a model reply, tolerating
/// surrounding prose and code fences. Braces inside strings are ignored.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find('{') else {
        return trimmed;
    };

    let remainder = &trimmed[start..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in remainder.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &remainder[..=i];
                }
            }
            _ => {}
        }
    }

    trimmed
}
