use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cogflow::flows::{
    optimize_prompt, recommend_tools, refine_collaboratively, route_query,
    select_efficient_model, LogicalModel, OptimizePromptInput, RecommendToolsInput, RefineInput,
    RefineOptions, RouteQueryInput, SelectModelInput,
};
use cogflow::schema::is_valid_url;
use cogflow::{FlowError, InvokeError, Invoker, Settings};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": content }, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 5, "completion_tokens": 7 }
    }))
}

fn invoker(server: &MockServer) -> Invoker {
    let settings = Settings {
        api_key: Some("sk-test".into()),
        base_url: server.uri(),
        ..Settings::default()
    };
    Invoker::from_settings(&settings).unwrap()
}

/// Text of the last message in an OpenAI-style request body.
fn last_message(req: &Request) -> String {
    let body: Value = serde_json::from_slice(&req.body).unwrap();
    body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn model_of(req: &Request) -> String {
    let body: Value = serde_json::from_slice(&req.body).unwrap();
    body["model"].as_str().unwrap_or_default().to_string()
}

fn is_json_mode(req: &Request) -> bool {
    let body: Value = serde_json::from_slice(&req.body).unwrap();
    body["response_format"]["type"] == "json_object"
}

async fn mount(server: &MockServer, responder: impl Respond + 'static) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(responder)
        .mount(server)
        .await;
}

struct Fixed(Value);

impl Respond for Fixed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        completion(&self.0.to_string())
    }
}

#[tokio::test]
async fn route_query_returns_closed_set_member() {
    let server = MockServer::start().await;
    mount(
        &server,
        Fixed(json!({ "model": "creativeModel", "reason": "It asks for a poem." })),
    )
    .await;

    let out = route_query(
        &invoker(&server),
        &RouteQueryInput {
            query: "write a poem about rust".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(out.model, LogicalModel::Creative);
    assert!(LogicalModel::ALL.contains(&out.model));

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(is_json_mode(&received[0]));
    assert_eq!(model_of(&received[0]), "google/gemini-2.0-flash-001");
}

#[tokio::test]
async fn route_query_rejects_unknown_model_name() {
    let server = MockServer::start().await;
    mount(&server, Fixed(json!({ "model": "llama-70b", "reason": "big" }))).await;

    let err = route_query(
        &invoker(&server),
        &RouteQueryInput {
            query: "what is 2+2".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(err.schema_violation().is_some());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn recommend_tools_normalizes_placeholder_logos() {
    let server = MockServer::start().await;
    mount(
        &server,
        Fixed(json!({
            "recommendations": [{
                "name": "DALL-E 3",
                "logoUrl": "https://picsum.photos/50/50?query=AI",
                "description": "Generates images from text.",
                "websiteUrl": "https://openai.com/dall-e-3",
                "taskCategory": "Image Generation"
            }, {
                "name": "Midjourney",
                "logoUrl": "https://picsum.photos/50/50",
                "description": "Artistic image generation.",
                "websiteUrl": "https://www.midjourney.com",
                "taskCategory": "Image Generation"
            }]
        })),
    )
    .await;

    let out = recommend_tools(
        &invoker(&server),
        &RecommendToolsInput {
            query: "generate a logo image".into(),
        },
    )
    .await
    .unwrap();

    assert!((1..=3).contains(&out.recommendations.len()));
    for rec in &out.recommendations {
        assert!(is_valid_url(&rec.logo_url));
        assert!(is_valid_url(&rec.website_url));
        assert_eq!(rec.logo_url, "https://picsum.photos/50/50?query=image");
    }
}

#[tokio::test]
async fn recommend_tools_fails_on_prose_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("Sorry, here are some thoughts instead of JSON."))
        .mount(&server)
        .await;

    let err = recommend_tools(
        &invoker(&server),
        &RecommendToolsInput {
            query: "translate a menu".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(err.is_no_structured_output());
}

/// Plain drafts name their model; structured calls answer by prompt kind.
struct RefineServer {
    critiques: Arc<AtomicUsize>,
}

impl Respond for RefineServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if !is_json_mode(request) {
            return completion(&format!("draft from {}", model_of(request)));
        }
        let user = last_message(request);
        if user.contains("Provide a concise critique") {
            let n = self.critiques.fetch_add(1, Ordering::SeqCst) + 1;
            completion(&json!({ "critique": format!("critique {n}") }).to_string())
        } else {
            let n = self.critiques.load(Ordering::SeqCst);
            completion(&json!({ "refinedOutput": format!("refined {n}") }).to_string())
        }
    }
}

#[tokio::test]
async fn refine_runs_n_minus_one_rounds_and_keeps_draft_order() {
    let server = MockServer::start().await;
    let critiques = Arc::new(AtomicUsize::new(0));
    mount(
        &server,
        RefineServer {
            critiques: critiques.clone(),
        },
    )
    .await;

    let models = vec!["m/one".to_string(), "m/two".into(), "m/three".into()];
    let out = refine_collaboratively(
        &invoker(&server),
        &RefineInput {
            query: "Explain borrowing.".into(),
            model_names: models.clone(),
        },
        &RefineOptions::default(),
    )
    .await
    .unwrap();

    let expected: Vec<String> = models.iter().map(|m| format!("draft from {m}")).collect();
    assert_eq!(out.intermediate_outputs, expected);
    assert_eq!(out.refined_output, "refined 2");
    assert_eq!(critiques.load(Ordering::SeqCst), 2);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3 + 2 * 2);
}

/// The named model's draft arrives late; everything else answers at once.
struct SlowDraft {
    slow_model: &'static str,
    inner: RefineServer,
}

impl Respond for SlowDraft {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let reply = self.inner.respond(request);
        if !is_json_mode(request) && model_of(request) == self.slow_model {
            reply.set_delay(Duration::from_millis(400))
        } else {
            reply
        }
    }
}

#[tokio::test]
async fn refine_keeps_model_order_when_the_first_draft_finishes_last() {
    let server = MockServer::start().await;
    mount(
        &server,
        SlowDraft {
            slow_model: "m/slow",
            inner: RefineServer {
                critiques: Arc::new(AtomicUsize::new(0)),
            },
        },
    )
    .await;

    let models = vec!["m/slow".to_string(), "m/fast".into(), "m/faster".into()];
    let out = refine_collaboratively(
        &invoker(&server),
        &RefineInput {
            query: "Explain lifetimes.".into(),
            model_names: models,
        },
        &RefineOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(
        out.intermediate_outputs,
        vec!["draft from m/slow", "draft from m/fast", "draft from m/faster"]
    );
    assert_eq!(out.refined_output, "refined 2");
}

#[tokio::test]
async fn refine_keeps_a_draft_that_opens_like_a_refusal() {
    let server = MockServer::start().await;
    let draft = "I can't stress enough how useful ownership is: it rules out data races.";

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(draft))
        .mount(&server)
        .await;

    let out = refine_collaboratively(
        &invoker(&server),
        &RefineInput {
            query: "Why does Rust have ownership?".into(),
            model_names: vec!["solo/model".into()],
        },
        &RefineOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(out.intermediate_outputs, vec![draft]);
    assert_eq!(out.refined_output, draft);
}

#[tokio::test]
async fn refine_with_one_model_makes_one_call() {
    let server = MockServer::start().await;
    mount(
        &server,
        RefineServer {
            critiques: Arc::new(AtomicUsize::new(0)),
        },
    )
    .await;

    let out = refine_collaboratively(
        &invoker(&server),
        &RefineInput {
            query: "q".into(),
            model_names: vec!["solo/model".into()],
        },
        &RefineOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(out.intermediate_outputs.len(), 1);
    assert_eq!(out.refined_output, out.intermediate_outputs[0]);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

/// Fails plain generation for one model, succeeds for the rest.
struct OneBadModel;

impl Respond for OneBadModel {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if model_of(request) == "broken/model" {
            ResponseTemplate::new(404).set_body_json(json!({
                "error": { "message": "No endpoints found for broken/model", "code": 404 }
            }))
        } else {
            completion("fine")
        }
    }
}

#[tokio::test]
async fn refine_surfaces_a_single_failed_draft() {
    let server = MockServer::start().await;
    mount(&server, OneBadModel).await;

    let err = refine_collaboratively(
        &invoker(&server),
        &RefineInput {
            query: "q".into(),
            model_names: vec!["ok/model".into(), "broken/model".into(), "ok/other".into()],
        },
        &RefineOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FlowError::Invoke(InvokeError::Provider(_))));
    assert!(err.to_string().contains("No endpoints found"));
}

struct OptimizeServer {
    rewrites: Arc<AtomicUsize>,
}

impl Respond for OptimizeServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let user = last_message(request);
        if user.contains("Provide constructive feedback") {
            completion(&json!({ "feedback": "be more specific" }).to_string())
        } else {
            let n = self.rewrites.fetch_add(1, Ordering::SeqCst) + 1;
            completion(&json!({ "optimizedPrompt": format!("prompt v{n}") }).to_string())
        }
    }
}

#[tokio::test]
async fn optimize_records_k_rounds_against_the_initial_prompt() {
    let server = MockServer::start().await;
    mount(
        &server,
        OptimizeServer {
            rewrites: Arc::new(AtomicUsize::new(0)),
        },
    )
    .await;

    let input = OptimizePromptInput {
        optimization_rounds: 3,
        ..OptimizePromptInput::new("Summarize this article.")
    };
    let out = optimize_prompt(&invoker(&server), &input).await.unwrap();

    assert_eq!(out.optimized_prompt, "prompt v3");
    let rounds: Vec<u32> = out.optimization_history.iter().map(|h| h.round).collect();
    assert_eq!(rounds, vec![1, 2, 3]);
    assert!(out
        .optimization_history
        .iter()
        .all(|h| h.prompt == "Summarize this article." && h.feedback == "be more specific"));

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 6);
    assert!(last_message(&received[4]).ends_with("Prompt: prompt v2"));
}

#[tokio::test]
async fn select_model_returns_a_candidate_with_reason() {
    let server = MockServer::start().await;
    mount(
        &server,
        Fixed(json!({
            "selectedModel": "fast-small",
            "reason": "Summarization is light work."
        })),
    )
    .await;

    let input = SelectModelInput {
        task_description: "summarize text".into(),
        available_models: vec!["fast-small".into(), "accurate-large".into()],
    };
    let out = select_efficient_model(&invoker(&server), &input)
        .await
        .unwrap();
    assert!(out.is_candidate(&input.available_models));
    assert!(!out.reason.trim().is_empty());

    let received = server.received_requests().await.unwrap();
    assert!(last_message(&received[0]).contains("fast-small, accurate-large"));
}

#[tokio::test]
async fn missing_credential_fails_at_first_call_not_at_startup() {
    let server = MockServer::start().await;
    let settings = Settings {
        api_key: None,
        base_url: server.uri(),
        ..Settings::default()
    };
    let invoker = Invoker::from_settings(&settings).unwrap();

    let err = route_query(&invoker, &RouteQueryInput { query: "hi".into() })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    assert!(server.received_requests().await.unwrap().is_empty());
}
