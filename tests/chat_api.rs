use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use ollama_openai_gateway::{
    backend::{mock::MockOllama, BackendError, OllamaChatResponse, OllamaResponseMessage},
    build_app,
    config::{GatewayConfig, StreamMode},
    state::AppState,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn app_with(backend: Arc<MockOllama>) -> Router {
    build_app(AppState::new_for_tests(backend))
}

fn chat_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .expect("request build")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request build")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

fn fine_reply() -> OllamaChatResponse {
    OllamaChatResponse {
        model: Some("mistral:7b-instruct".to_owned()),
        created_at: Some(json!(1000)),
        message: Some(OllamaResponseMessage {
            role: Some("assistant".to_owned()),
            content: Some("I'm fine!".to_owned()),
        }),
        done: Some(true),
        prompt_eval_count: Some(5),
        eval_count: Some(3),
    }
}

#[tokio::test]
async fn chat_completion_is_translated_both_ways() {
    let backend = Arc::new(MockOllama::default().with_chat_response(fine_reply()));
    let app = app_with(backend.clone());

    let response = app
        .oneshot(chat_request(
            r#"{"model":"mistral","messages":[{"role":"user","content":"Hello! How are you?"}],"temperature":0.7}"#,
        ))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "mistral");
    assert_eq!(body["created"], 1000);
    assert_eq!(
        body["choices"],
        json!([{
            "index": 0,
            "message": {"role": "assistant", "content": "I'm fine!"},
            "finish_reason": "stop"
        }])
    );
    assert_eq!(
        body["usage"],
        json!({"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8})
    );
    assert!(body["id"].as_str().is_some_and(|id| id.starts_with("chatcmpl-")));

    let received = backend.received().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].model, "mistral");
    assert!(!received[0].stream);
    assert_eq!(received[0].options.temperature, Some(0.7));
    let forwarded = serde_json::to_value(&received[0]).expect("serializable");
    assert_eq!(
        forwarded["messages"],
        json!([{"role": "user", "content": "Hello! How are you?"}])
    );
    let option_keys: Vec<&String> = forwarded["options"]
        .as_object()
        .expect("options object")
        .keys()
        .collect();
    assert_eq!(option_keys, ["temperature"]);
}

#[tokio::test]
async fn omitted_options_are_not_forwarded() {
    let backend = Arc::new(MockOllama::default());
    let app = app_with(backend.clone());

    let response = app
        .oneshot(chat_request(
            r#"{"model":"mistral","messages":[{"role":"system","content":"terse"},{"role":"user","content":"hi"}]}"#,
        ))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    let received = backend.received().await;
    assert_eq!(received[0].options.temperature, None);
    assert_eq!(received[0].options.num_predict, None);
    assert_eq!(received[0].messages[0].role, "system");
    assert_eq!(received[0].messages[1].content, "hi");
}

#[tokio::test]
async fn max_tokens_is_forwarded_as_num_predict() {
    let backend = Arc::new(MockOllama::default());
    let app = app_with(backend.clone());

    let response = app
        .oneshot(chat_request(
            r#"{"model":"mistral","messages":[{"role":"user","content":"hi"}],"max_tokens":50}"#,
        ))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    let received = backend.received().await;
    assert_eq!(received[0].options.num_predict, Some(50));
    assert_eq!(received[0].options.temperature, None);
}

#[tokio::test]
async fn connection_failure_maps_to_503() {
    let backend = Arc::new(
        MockOllama::default()
            .with_chat_error(BackendError::Connection("tcp connect refused".to_owned())),
    );
    let app = app_with(backend);

    let response = app
        .oneshot(chat_request(
            r#"{"model":"mistral","messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    let message = body["error"]["message"].as_str().expect("message present");
    assert!(message.contains("tcp connect refused"));
}

#[tokio::test]
async fn backend_status_is_mirrored_with_its_body() {
    let backend = Arc::new(MockOllama::default().with_chat_error(BackendError::Status {
        status: StatusCode::NOT_FOUND,
        body: r#"{"error":"model 'ghost' not found"}"#.to_owned(),
    }));
    let app = app_with(backend);

    let response = app
        .oneshot(chat_request(
            r#"{"model":"ghost","messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(
        body["error"]["message"],
        r#"{"error":"model 'ghost' not found"}"#
    );
}

#[tokio::test]
async fn empty_backend_error_body_gets_fallback_text() {
    let backend = Arc::new(MockOllama::default().with_chat_error(BackendError::Status {
        status: StatusCode::BAD_GATEWAY,
        body: String::new(),
    }));
    let app = app_with(backend);

    let response = app
        .oneshot(chat_request(
            r#"{"model":"mistral","messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["message"], "Ollama service error");
}

#[tokio::test]
async fn reply_without_content_is_an_internal_error() {
    let mut reply = fine_reply();
    reply.message = Some(OllamaResponseMessage {
        role: Some("assistant".to_owned()),
        content: None,
    });
    let backend = Arc::new(MockOllama::default().with_chat_response(reply));
    let app = app_with(backend);

    let response = app
        .oneshot(chat_request(
            r#"{"model":"mistral","messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "server_error");
}

#[tokio::test]
async fn slow_model_does_not_stall_other_requests() {
    let backend = Arc::new(
        MockOllama::default().with_chat_delay("slow-model", Duration::from_secs(2)),
    );
    let app = app_with(backend.clone());

    let slow = tokio::spawn(app.clone().oneshot(chat_request(
        r#"{"model":"slow-model","messages":[{"role":"user","content":"take your time"}]}"#,
    )));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    let fast = tokio::time::timeout(
        Duration::from_millis(500),
        app.oneshot(chat_request(
            r#"{"model":"fast-model","messages":[{"role":"user","content":"quick"}]}"#,
        )),
    )
    .await
    .expect("fast request should not wait for the slow one")
    .expect("request execution");
    let fast_elapsed = started.elapsed();

    assert_eq!(fast.status(), StatusCode::OK);
    assert_eq!(json_body(fast).await["model"], "fast-model");
    assert!(fast_elapsed < Duration::from_millis(500));
    assert!(!slow.is_finished());

    let slow = slow
        .await
        .expect("slow task joins")
        .expect("request execution");
    assert_eq!(slow.status(), StatusCode::OK);
    let slow_body = json_body(slow).await;
    assert_eq!(slow_body["model"], "slow-model");
    assert!(slow_body["choices"][0]["message"]["content"]
        .as_str()
        .is_some_and(|content| content.contains("take your time")));

    let models: Vec<String> = backend
        .received()
        .await
        .into_iter()
        .map(|request| request.model)
        .collect();
    assert_eq!(models, ["fast-model", "slow-model"]);
}

#[tokio::test]
async fn malformed_body_is_rejected_before_backend_call() {
    let backend = Arc::new(MockOllama::default());
    let app = app_with(backend.clone());

    let response = app
        .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(backend.received().await.is_empty());
}

#[tokio::test]
async fn empty_messages_are_rejected() {
    let backend = Arc::new(MockOllama::default());
    let app = app_with(backend.clone());

    let response = app
        .oneshot(chat_request(r#"{"model":"mistral","messages":[]}"#))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(backend.received().await.is_empty());
}

#[tokio::test]
async fn streaming_is_rejected_by_default() {
    let backend = Arc::new(MockOllama::default());
    let app = app_with(backend.clone());

    let response = app
        .oneshot(chat_request(
            r#"{"model":"mistral","messages":[{"role":"user","content":"hi"}],"stream":true}"#,
        ))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(backend.received().await.is_empty());
}

#[tokio::test]
async fn streaming_is_downgraded_when_configured() {
    let backend = Arc::new(MockOllama::default());
    let config = GatewayConfig {
        stream_mode: StreamMode::Downgrade,
        ..GatewayConfig::default()
    };
    let app = build_app(AppState::new(backend.clone(), config));

    let response = app
        .oneshot(chat_request(
            r#"{"model":"mistral","messages":[{"role":"user","content":"hi"}],"stream":true}"#,
        ))
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["object"], "chat.completion");
    assert!(!backend.received().await[0].stream);
}

#[tokio::test]
async fn models_are_listed_in_openai_shape() {
    let app = app_with(Arc::new(MockOllama::default().with_models(["mistral"])));

    let response = app.oneshot(get("/v1/models")).await.expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({
            "object": "list",
            "data": [{"id": "mistral", "object": "model", "created": 0, "owned_by": "ollama"}]
        })
    );
}

#[tokio::test]
async fn unreachable_backend_makes_models_503() {
    let backend = Arc::new(
        MockOllama::default().with_models_error(BackendError::Timeout("5s elapsed".to_owned())),
    );
    let app = app_with(backend);

    let response = app.oneshot(get("/v1/models")).await.expect("request execution");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn garbled_tag_listing_is_500() {
    let backend = Arc::new(
        MockOllama::default()
            .with_models_error(BackendError::InvalidResponse("expected value".to_owned())),
    );
    let app = app_with(backend);

    let response = app.oneshot(get("/v1/models")).await.expect("request execution");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_reports_unhealthy_without_failing() {
    let backend = Arc::new(
        MockOllama::default().with_models_error(BackendError::Connection("dns error".to_owned())),
    );
    let app = app_with(backend);

    let response = app.oneshot(get("/health")).await.expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert!(body["error"].as_str().is_some_and(|e| e.contains("dns error")));
}

#[tokio::test]
async fn root_banner_and_metrics_are_served() {
    let app = app_with(Arc::new(MockOllama::default()));

    let banner = app.clone().oneshot(get("/")).await.expect("request execution");
    assert_eq!(banner.status(), StatusCode::OK);
    assert!(json_body(banner).await["message"].is_string());

    let _ = app
        .clone()
        .oneshot(get("/v1/models"))
        .await
        .expect("request execution");
    let metrics = app.oneshot(get("/metrics")).await.expect("request execution");
    assert_eq!(metrics.status(), StatusCode::OK);
    let bytes = to_bytes(metrics.into_body(), 1024 * 1024)
        .await
        .expect("body should be readable");
    let text = String::from_utf8(bytes.to_vec()).expect("metrics should be UTF-8");
    assert!(text.contains("gateway_http_requests_total"));
}
