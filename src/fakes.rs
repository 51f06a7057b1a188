//! In-memory gateway double for deterministic pipeline tests.
//!
//! [`ScriptedGateway`] answers from a queue of canned replies, then from an
//! optional responder closure, and records every request it receives.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::gateway::{ChatGateway, ChatRequest, ChatResponse, ProviderError};

type Reply = Result<ChatResponse, ProviderError>;
type Responder = Box<dyn Fn(&ChatRequest) -> Reply + Send + Sync>;

#[derive(Default)]
pub struct ScriptedGateway {
    queue: Mutex<VecDeque<Reply>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<ChatRequest>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(self, content: impl Into<String>) -> Self {
        lock(&self.queue).push_back(Ok(ChatResponse::text(content)));
        self
    }

    pub fn push_json(self, body: Value) -> Self {
        self.push_text(body.to_string())
    }

    pub fn push_error(self, err: ProviderError) -> Self {
        lock(&self.queue).push_back(Err(err));
        self
    }

    /// Answer requests computed from the request itself once the queue is drained.
    pub fn with_responder(
        mut self,
        responder: impl Fn(&ChatRequest) -> Reply + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Requests whose attribution caller matches `caller`.
    pub fn requests_for(&self, caller: &str) -> Vec<ChatRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.attribution.caller == caller)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        lock(&self.requests).push(req.clone());

        if let Some(reply) = lock(&self.queue).pop_front() {
            return reply;
        }
        match &self.responder {
            Some(responder) => responder(&req),
            None => Err(ProviderError::not_sent("no scripted reply left")),
        }
    }
}
