use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use base64::Engine;
use serde_json::{Value, json};

use uicompare::feedback::{
    AnthropicProvider, FeedbackProvider, OpenAiProvider, ProviderError, ProviderKind, select_provider,
};
use uicompare::settings::FeedbackSettings;

const IMAGE: &[u8] = b"\x89PNG\r\n\x1a\nfake";

type Seen = Arc<Mutex<Option<(HeaderMap, Value)>>>;

/// Serve `router` on an ephemeral port and return its base URL.
async fn spawn_mock(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn recording(path: &str, reply: Value) -> (Router, Seen) {
    let seen: Seen = Arc::new(Mutex::new(None));
    let store = seen.clone();
    let router = Router::new().route(
        path,
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let store = store.clone();
            let reply = reply.clone();
            async move {
                *store.lock().unwrap() = Some((headers, body));
                Json(reply)
            }
        }),
    );
    (router, seen)
}

#[tokio::test]
async fn anthropic_sends_image_and_reads_text_blocks() {
    let (router, seen) = recording(
        "/v1/messages",
        json!({
            "content": [
                { "type": "text", "text": "## Summary" },
                { "type": "text", "text": "Contrast is too low." }
            ]
        }),
    );
    let settings = FeedbackSettings {
        anthropic_base_url: spawn_mock(router).await,
        ..Default::default()
    };

    let provider = AnthropicProvider::new("sk-ant-test", &settings).unwrap();
    let text = provider.feedback(IMAGE).await.unwrap();
    assert_eq!(text, "## Summary\n\nContrast is too low.");

    let (headers, body) = seen.lock().unwrap().take().unwrap();
    assert_eq!(headers["x-api-key"], "sk-ant-test");
    assert_eq!(headers["anthropic-version"], "2023-06-01");
    assert_eq!(body["model"], "claude-3-7-sonnet-latest");
    assert_eq!(body["max_tokens"], 4000);

    let content = &body["messages"][0]["content"];
    assert_eq!(content[0]["type"], "text");
    assert_eq!(content[1]["source"]["media_type"], "image/png");
    let sent = base64::engine::general_purpose::STANDARD
        .decode(content[1]["source"]["data"].as_str().unwrap())
        .unwrap();
    assert_eq!(sent, IMAGE);
}

#[tokio::test]
async fn openai_sends_data_url_and_reads_first_choice() {
    let (router, seen) = recording(
        "/chat/completions",
        json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Align the header." } }
            ]
        }),
    );
    let settings = FeedbackSettings {
        openai_base_url: spawn_mock(router).await,
        openai_model: "gpt-4o-mini".to_string(),
        ..Default::default()
    };

    let provider = OpenAiProvider::new("sk-test", &settings).unwrap();
    assert_eq!(provider.feedback(IMAGE).await.unwrap(), "Align the header.");

    let (headers, body) = seen.lock().unwrap().take().unwrap();
    assert_eq!(headers["authorization"], "Bearer sk-test");
    assert_eq!(body["model"], "gpt-4o-mini");
    let url = body["messages"][0]["content"][1]["image_url"]["url"].as_str().unwrap();
    let encoded = url.strip_prefix("data:image/png;base64,").unwrap();
    assert_eq!(
        base64::engine::general_purpose::STANDARD.decode(encoded).unwrap(),
        IMAGE
    );
}

#[tokio::test]
async fn error_status_is_reported_with_body() {
    let router = Router::new().route(
        "/v1/messages",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
    );
    let settings = FeedbackSettings {
        anthropic_base_url: spawn_mock(router).await,
        ..Default::default()
    };

    let provider = AnthropicProvider::new("key", &settings).unwrap();
    match provider.feedback(IMAGE).await.unwrap_err() {
        ProviderError::Status {
            provider,
            status,
            body,
        } => {
            assert_eq!(provider, "anthropic");
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn reply_without_text_is_empty_response() {
    let (router, _seen) = recording("/chat/completions", json!({ "choices": [] }));
    let settings = FeedbackSettings {
        openai_base_url: spawn_mock(router).await,
        ..Default::default()
    };

    let provider = OpenAiProvider::new("key", &settings).unwrap();
    assert!(matches!(
        provider.feedback(IMAGE).await,
        Err(ProviderError::EmptyResponse { provider: "openai" })
    ));
}

#[tokio::test]
async fn unreachable_provider_is_request_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let settings = FeedbackSettings {
        openai_base_url: format!("http://{}", addr),
        ..Default::default()
    };
    let provider = OpenAiProvider::new("key", &settings).unwrap();
    assert!(matches!(
        provider.feedback(IMAGE).await,
        Err(ProviderError::Request { .. })
    ));
}

#[test]
fn provider_keys_map_to_kinds() {
    assert_eq!(ProviderKind::from_key(None), ProviderKind::Anthropic);
    assert_eq!(ProviderKind::from_key(Some("")), ProviderKind::Anthropic);
    assert_eq!(ProviderKind::from_key(Some("anthropic")), ProviderKind::Anthropic);
    assert_eq!(ProviderKind::from_key(Some("Claude")), ProviderKind::Anthropic);
    assert_eq!(ProviderKind::from_key(Some("openai")), ProviderKind::OpenAi);
    assert_eq!(ProviderKind::from_key(Some("GPT")), ProviderKind::OpenAi);
    assert_eq!(ProviderKind::from_key(Some("none")), ProviderKind::Disabled);
    assert_eq!(ProviderKind::from_key(Some("mistral")), ProviderKind::Anthropic);
}

#[test]
fn select_provider_requires_a_key() {
    assert!(select_provider(&FeedbackSettings::default()).is_none());

    let openai_without_key = FeedbackSettings {
        provider: Some("openai".to_string()),
        anthropic_api_key: Some("sk-ant".to_string()),
        ..Default::default()
    };
    assert!(select_provider(&openai_without_key).is_none());
}

#[test]
fn select_provider_follows_configuration() {
    let default = FeedbackSettings {
        anthropic_api_key: Some("sk-ant".to_string()),
        openai_api_key: Some("sk-oa".to_string()),
        ..Default::default()
    };
    assert_eq!(select_provider(&default).unwrap().name(), "anthropic");

    let openai = FeedbackSettings {
        provider: Some("openai".to_string()),
        ..default.clone()
    };
    assert_eq!(select_provider(&openai).unwrap().name(), "openai");

    let disabled = FeedbackSettings {
        provider: Some("none".to_string()),
        ..default
    };
    assert!(select_provider(&disabled).is_none());
}

#[test]
fn anthropic_rejects_key_that_is_not_a_header_value() {
    let settings = FeedbackSettings::default();
    match AnthropicProvider::new("sk-ant\nsecond-line", &settings) {
        Err(ProviderError::InvalidApiKey { provider }) => assert_eq!(provider, "anthropic"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("key with a newline was accepted"),
    }

    let configured = FeedbackSettings {
        anthropic_api_key: Some("sk-ant\nsecond-line".to_string()),
        ..Default::default()
    };
    assert!(select_provider(&configured).is_none());
}
