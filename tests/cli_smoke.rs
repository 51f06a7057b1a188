use std::process::{Command, Output};

use serde_json::{json, Value};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cogflow(args: &[&str], envs: &[(&str, &str)]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cogflow"));
    cmd.args(args)
        .env_remove("OPENROUTER_API_KEY")
        .env_remove("OPENROUTER_BASE_URL")
        .env_remove("COGFLOW_DEFAULT_MODEL")
        .env_remove("RUST_LOG");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    cmd
}

async fn run(mut cmd: Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

fn completion(content: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": content.to_string() }, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
    }))
}

#[test]
fn missing_key_warns_and_fails_on_first_call() {
    let output = cogflow(
        &["route", "--query", "hello"],
        &[("OPENROUTER_BASE_URL", "http://127.0.0.1:9")],
    )
    .output()
    .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("OPENROUTER_API_KEY"));
    assert!(output.stdout.is_empty());
}

#[test]
fn invalid_input_is_rejected_before_any_call() {
    let output = cogflow(
        &["optimize", "--prompt", "p", "--rounds", "11"],
        &[("OPENROUTER_API_KEY", "sk-test"), ("OPENROUTER_BASE_URL", "http://127.0.0.1:9")],
    )
    .output()
    .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("optimizationRounds"));
}

#[tokio::test(flavor = "multi_thread")]
async fn route_prints_json_decision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(json!({
            "model": "mathematicalModel",
            "reason": "Arithmetic."
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let output = run(cogflow(
        &["route", "--query", "what is 17 * 23", "--model", "test/model"],
        &[("OPENROUTER_API_KEY", "sk-test"), ("OPENROUTER_BASE_URL", uri.as_str())],
    ))
    .await;

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let decision: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(decision["model"], "mathematicalModel");
    assert_eq!(decision["reason"], "Arithmetic.");

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["model"], "test/model");
}

#[tokio::test(flavor = "multi_thread")]
async fn select_reads_request_file_and_writes_out_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(json!({
            "selectedModel": "fast-small",
            "reason": "Cheap and adequate."
        })))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let request_path = dir.path().join("select.json");
    let out_path = dir.path().join("decision.json");
    std::fs::write(
        &request_path,
        json!({
            "taskDescription": "summarize text",
            "availableModels": ["fast-small", "accurate-large"]
        })
        .to_string(),
    )
    .unwrap();

    let uri = server.uri();
    let request_arg = request_path.to_string_lossy().to_string();
    let out_arg = out_path.to_string_lossy().to_string();
    let output = run(cogflow(
        &["select", "--request", &request_arg, "--out", &out_arg],
        &[("OPENROUTER_API_KEY", "sk-test"), ("OPENROUTER_BASE_URL", uri.as_str())],
    ))
    .await;

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let decision: Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(decision["selectedModel"], "fast-small");
}
