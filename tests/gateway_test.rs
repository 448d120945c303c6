use std::time::Duration;

use actix_web::{http::StatusCode, test, web};
use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use falbridge::fal::RawReply;
use falbridge::server::handlers::HELP_MESSAGE;
use falbridge::{
    build_app, AppState, BackgroundTasks, GatewayConfig, GatewayError, JobEngine, ModelRegistry,
    PollConfig, QueueTransport,
};

const ACCESS_KEY: &str = "worker-secret";
const FAL_KEY: &str = "fal-secret";

fn gateway_config(base_url: &str) -> GatewayConfig {
    GatewayConfig::new()
        .with_access_key(ACCESS_KEY)
        .with_fal_api_key(FAL_KEY)
        .with_queue_base_url(base_url)
        .with_poll(
            PollConfig::new()
                .with_interval(Duration::ZERO)
                .with_max_attempts(5),
        )
}

fn state(config: GatewayConfig) -> web::Data<AppState> {
    let registry = ModelRegistry::from_config(&config).unwrap();
    web::Data::new(AppState::new(config, registry, BackgroundTasks::current()))
}

/// Queue that accepts one Imagen job and completes it with `urls`.
async fn completing_queue(urls: &[String]) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/fal-ai/imagen4/preview"))
        .and(header("authorization", "Key fal-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"request_id": "req-1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/imagen4/requests/req-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "COMPLETED"})))
        .mount(&server)
        .await;

    let images: Vec<Value> = urls.iter().map(|url| json!({"url": url})).collect();
    Mock::given(method("GET"))
        .and(path("/fal-ai/imagen4/requests/req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"images": images})))
        .mount(&server)
        .await;

    server
}

fn bearer() -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", ACCESS_KEY))
}

/// Splits an event-stream body into its `data:` payloads.
fn sse_payloads(body: &[u8]) -> Vec<String> {
    String::from_utf8(body.to_vec())
        .unwrap()
        .split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| frame.strip_prefix("data: ").unwrap().to_string())
        .collect()
}

fn chunk_content(payload: &str) -> String {
    let chunk: Value = serde_json::from_str(payload).unwrap();
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

fn streamed_chat(prompt: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/v1/chat/completions")
        .insert_header(bearer())
        .set_json(json!({
            "stream": true,
            "messages": [{"role": "user", "content": prompt}]
        }))
}

/// Transport that never reaches the queue host.
struct Unreachable;

#[async_trait]
impl QueueTransport for Unreachable {
    async fn submit(&self, _url: &str, _payload: &Value) -> falbridge::Result<RawReply> {
        Err(GatewayError::Request("connection refused".into()))
    }

    async fn fetch(&self, _url: &str) -> falbridge::Result<RawReply> {
        Err(GatewayError::Request("connection refused".into()))
    }

    async fn download(&self, _url: &str) -> falbridge::Result<RawReply> {
        Err(GatewayError::Request("connection refused".into()))
    }
}

#[actix_web::test]
async fn test_image_generation_returns_urls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/imagen4/preview"))
        .and(body_partial_json(json!({"num_images": 2, "aspect_ratio": "16:9"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"request_id": "req-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/imagen4/requests/req-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "COMPLETED"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/imagen4/requests/req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [{"url": "https://cdn/a.png"}, {"url": "https://cdn/b.png"}]
        })))
        .mount(&server)
        .await;

    let app = test::init_service(build_app(state(gateway_config(&server.uri())))).await;
    let req = test::TestRequest::post()
        .uri("/v1/images/generations")
        .insert_header(bearer())
        .set_json(json!({"prompt": "a red fox", "n": 2, "size": "16:9"}))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["model"], "imagen4-preview");
    assert_eq!(
        body["data"],
        json!([{"url": "https://cdn/a.png"}, {"url": "https://cdn/b.png"}])
    );
    assert!(body["created"].as_i64().unwrap() > 0);
}

#[actix_web::test]
async fn test_image_generation_b64_json() {
    let server = MockServer::start().await;
    let image_url = format!("{}/files/a.png", server.uri());
    Mock::given(method("GET"))
        .and(path("/files/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
        .mount(&server)
        .await;
    let queue = completing_queue(&[image_url]).await;

    let app = test::init_service(build_app(state(gateway_config(&queue.uri())))).await;
    let req = test::TestRequest::post()
        .uri("/v1/images/generations")
        .insert_header(bearer())
        .set_json(json!({"prompt": "a red fox", "response_format": "b64_json"}))
        .to_request();

    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"], json!([{"b64_json": "cG5n"}]));
}

#[actix_web::test]
async fn test_image_generation_validation() {
    let app = test::init_service(build_app(state(gateway_config("http://127.0.0.1:9")))).await;

    let req = test::TestRequest::post()
        .uri("/v1/images/generations")
        .insert_header(bearer())
        .set_json(json!({"prompt": "x", "model": "dall-e-3"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(
        body["error"]["message"],
        "Unsupported model: dall-e-3. Supported models are: imagen4-preview, flux-1.1-pro-ultra"
    );

    let req = test::TestRequest::post()
        .uri("/v1/images/generations")
        .insert_header(bearer())
        .set_json(json!({"n": 1}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Parameter 'prompt' is required.");

    let req = test::TestRequest::post()
        .uri("/v1/images/generations")
        .insert_header(bearer())
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_authentication_and_configuration_errors() {
    let app = test::init_service(build_app(state(gateway_config("http://127.0.0.1:9")))).await;

    let req = test::TestRequest::get().uri("/v1/models").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "authentication_error");

    let req = test::TestRequest::get()
        .uri("/v1/models")
        .insert_header(("Authorization", "Bearer wrong"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let unconfigured = GatewayConfig::new().with_access_key(ACCESS_KEY);
    let app = test::init_service(build_app(state(unconfigured))).await;
    let req = test::TestRequest::get()
        .uri("/v1/models")
        .insert_header(bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["type"], "configuration_error");
    assert_eq!(body["error"]["message"], "FAL_API_KEY is not configured.");
}

#[actix_web::test]
async fn test_models_and_not_found() {
    let app = test::init_service(build_app(state(gateway_config("http://127.0.0.1:9")))).await;

    let req = test::TestRequest::get()
        .uri("/v1/models")
        .insert_header(bearer())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["object"], "list");
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|card| card["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["imagen4-preview", "flux-1.1-pro-ultra"]);
    assert_eq!(body["data"][0]["owned_by"], "fal-ai");
    assert_eq!(body["data"][0]["created"], body["data"][1]["created"]);

    // Unknown paths and known paths with the wrong method both fall through.
    let unmatched = [
        test::TestRequest::get().uri("/v1/nothing-here"),
        test::TestRequest::get().uri("/v1/images/generations"),
        test::TestRequest::post().uri("/v1/models"),
    ];
    for req in unmatched {
        let resp = test::call_service(&app, req.insert_header(bearer()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"error": {"message": "Not Found", "type": "not_found_error"}}));
    }
}

#[actix_web::test]
async fn test_chat_completion_non_streaming() {
    let queue = completing_queue(&["https://cdn/cat.png".to_string()]).await;
    let app = test::init_service(build_app(state(gateway_config(&queue.uri())))).await;

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .insert_header(bearer())
        .set_json(json!({
            "messages": [{"role": "user", "content": "a cat 比例:16:9"}]
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "imagen4-preview");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "Generated image with prompt: \"a cat\" and aspect ratio: 16:9 using Imagen4 Preview\n\n![Generated Image](https://cdn/cat.png)"
    );
}

#[actix_web::test]
async fn test_chat_completion_failure_is_500() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/imagen4/preview"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad prompt"))
        .mount(&server)
        .await;
    let app = test::init_service(build_app(state(gateway_config(&server.uri())))).await;

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .insert_header(bearer())
        .set_json(json!({"messages": [{"role": "user", "content": "a dog"}]}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = test::read_body_json(resp).await;
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.starts_with(
        "An error occurred for prompt \"a dog\" with aspect ratio 1:1 using Imagen4 Preview:"
    ));
    assert!(content.contains("422"));
}

#[actix_web::test]
async fn test_chat_completion_streaming() {
    let queue = completing_queue(&["https://cdn/dog.png".to_string()]).await;
    let app = test::init_service(build_app(state(gateway_config(&queue.uri())))).await;

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .insert_header(bearer())
        .set_json(json!({
            "stream": true,
            "messages": [{"role": "user", "content": "a dog 9:16"}]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();

    assert_eq!(frames.len(), 5);
    assert_eq!(*frames.last().unwrap(), "data: [DONE]");

    let chunks: Vec<Value> = frames[..4]
        .iter()
        .map(|f| serde_json::from_str(f.strip_prefix("data: ").unwrap()).unwrap())
        .collect();
    assert_eq!(chunks[0]["choices"][0]["delta"], json!({"role": "assistant"}));
    assert_eq!(
        chunks[1]["choices"][0]["delta"]["content"],
        "🎨 Generating image with prompt: \"a dog\" and aspect ratio: 9:16 using Imagen4 Preview..."
    );
    assert_eq!(
        chunks[2]["choices"][0]["delta"]["content"],
        "\n\nHere is the image:\n\n![Generated Image](https://cdn/dog.png)"
    );
    assert_eq!(chunks[3]["choices"][0]["finish_reason"], "stop");
}

#[actix_web::test]
async fn test_chat_help_reply() {
    let app = test::init_service(build_app(state(gateway_config("http://127.0.0.1:9")))).await;

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .insert_header(bearer())
        .set_json(json!({"messages": [{"role": "user", "content": "  "}]}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["choices"][0]["message"]["content"], HELP_MESSAGE);

    let req = test::TestRequest::post()
        .uri("/v1/chat/completions")
        .insert_header(bearer())
        .set_json(json!({"stream": true, "messages": []}))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("Please provide a description for the image."));
    assert!(text.ends_with("data: [DONE]\n\n"));
}

#[actix_web::test]
async fn test_chat_streaming_reports_failed_job_in_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/imagen4/preview"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"request_id": "req-9"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fal-ai/imagen4/requests/req-9/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "FAILED", "logs": ["x"]})),
        )
        .mount(&server)
        .await;
    let app = test::init_service(build_app(state(gateway_config(&server.uri())))).await;

    let resp = test::call_service(&app, streamed_chat("a lighthouse 3:2").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let payloads = sse_payloads(&test::read_body(resp).await);

    assert_eq!(payloads.len(), 5);
    assert_eq!(
        chunk_content(&payloads[2]),
        "\n\nAn error occurred with Imagen4 Preview: Fal.ai request for Imagen4 Preview (req-9) FAILED. Logs: [\"x\"]"
    );
    let terminal: Value = serde_json::from_str(&payloads[3]).unwrap();
    assert_eq!(terminal["choices"][0]["finish_reason"], "stop");
    assert_eq!(terminal["choices"][0]["delta"], json!({}));
    assert_eq!(payloads[4], "[DONE]");
}

#[actix_web::test]
async fn test_injected_engine_transport_errors_surface_in_stream() {
    let config = gateway_config("http://127.0.0.1:9");
    let engine = JobEngine::new(std::sync::Arc::new(Unreachable), config.poll.clone());
    let registry = ModelRegistry::from_config(&config).unwrap();
    let state = AppState::new(config, registry, BackgroundTasks::current()).with_engine(engine);
    let app = test::init_service(build_app(web::Data::new(state))).await;

    let resp = test::call_service(&app, streamed_chat("a dog").to_request()).await;
    let payloads = sse_payloads(&test::read_body(resp).await);

    assert_eq!(payloads.len(), 5);
    assert!(chunk_content(&payloads[2])
        .starts_with("\n\nAn error occurred with Imagen4 Preview: Fal.ai API request to Imagen4 Preview failed:"));
    assert!(chunk_content(&payloads[2]).contains("connection refused"));
    assert_eq!(payloads[4], "[DONE]");
}
