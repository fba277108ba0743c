use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use mailquota_rs::api::UsageServer;
use mailquota_rs::config::AccountConfig;
use mailquota_rs::transport::mock::MockTransport;
use mailquota_rs::ServiceConfig;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(transport: MockTransport, with_account: bool) -> Router {
    let mut config = ServiceConfig::development();
    if with_account {
        config.account = Some(AccountConfig {
            host: "imap.example.com".to_string(),
            port: 993,
            user: "alice@example.com".to_string(),
            password: "secret".to_string(),
            tls: true,
        });
    }
    UsageServer::new(&config, transport).router()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("Request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = serde_json::from_slice(&bytes).expect("Invalid JSON");
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app(MockTransport::new(), false), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string(), "Should have timestamp field");
}

#[tokio::test]
async fn test_get_mailbox_without_default_account() {
    let (status, body) = send(app(MockTransport::new(), false), get("/mailbox")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "IMAP configuration not set");
}

#[tokio::test]
async fn test_get_mailbox_quota() {
    let transport = MockTransport::new().with_quota(json!({ "quota": { "STORAGE": [51200, 102400] } }));
    let stats = transport.stats();

    let (status, body) = send(app(transport, true), get("/mailbox")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["type"], "quota");
    assert_eq!(body["data"]["usedMB"], 50.0);
    assert_eq!(body["data"]["limitMB"], 100.0);
    assert_eq!(body["data"]["percentUsed"], 50.0);
    assert_eq!(body["data"]["availableMB"], 50.0);
    assert_eq!(stats.disconnects(), 1);
}

#[tokio::test]
async fn test_post_mailbox_manual_fallback() {
    let transport = MockTransport::new().with_messages(vec![1000, 2500, 700]);

    let (status, body) = send(
        app(transport, false),
        post(
            "/mailbox",
            json!({ "user": "bob@example.com", "password": "pw", "host": "imap.example.com" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "manual");
    assert_eq!(body["data"]["messageCount"], 3);
    assert_eq!(body["data"]["totalSizeMB"], 0.0);
    assert_eq!(body["data"]["note"], "Size limit not available via IMAP");
}

#[tokio::test]
async fn test_post_mailbox_missing_fields() {
    let transport = MockTransport::new();
    let stats = transport.stats();

    let (status, body) = send(
        app(transport, false),
        post("/mailbox", json!({ "user": "bob@example.com" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");
    assert_eq!(body["required"], json!(["user", "password", "host"]));
    assert_eq!(stats.connects(), 0);
}

#[tokio::test]
async fn test_post_mailbox_connection_error() {
    let transport = MockTransport::new().refuse_host("down.example.com");

    let (status, body) = send(
        app(transport, false),
        post(
            "/mailbox",
            json!({ "user": "bob", "password": "pw", "host": "down.example.com", "port": 143 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Protocol error: connection to down.example.com refused");
}

#[tokio::test]
async fn test_post_mailbox_usage_unavailable() {
    let transport = MockTransport::new().with_mailbox_error("NO no such mailbox");
    let stats = transport.stats();

    let (status, body) = send(
        app(transport, false),
        post(
            "/mailbox",
            json!({ "user": "bob", "password": "pw", "host": "imap.example.com" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("Mailbox usage unavailable"));
    assert_eq!(stats.disconnects(), 1);
}

#[tokio::test]
async fn test_batch_requires_accounts_array() {
    let (status, body) = send(
        app(MockTransport::new(), false),
        post("/mailbox/batch", json!({ "accounts": "alice" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
}

#[tokio::test]
async fn test_batch_mixed_results() {
    let transport = MockTransport::new()
        .with_quota(json!({ "User quota": { "storage": { "usage": 30720, "limit": 61440 } } }))
        .refuse_host("down.example.com");

    let (status, body) = send(
        app(transport, false),
        post(
            "/mailbox/batch",
            json!({
                "accounts": [
                    { "user": "alice", "password": "pw", "host": "imap.example.com" },
                    { "password": "pw", "host": "imap.example.com" },
                    { "user": "carol", "password": "pw", "host": "down.example.com" }
                ]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().expect("No results array");
    assert_eq!(results.len(), 3);

    assert_eq!(results[0]["account"], "alice");
    assert_eq!(results[0]["success"], true);
    assert_eq!(results[0]["type"], "quota");
    assert_eq!(results[0]["data"]["percentUsed"], 50.0);

    assert_eq!(results[1]["account"], "unknown");
    assert_eq!(results[1]["success"], false);
    assert_eq!(results[1]["error"], "Missing required fields");

    assert_eq!(results[2]["account"], "carol");
    assert_eq!(results[2]["success"], false);
}

#[tokio::test]
async fn test_unknown_route() {
    let (status, body) = send(app(MockTransport::new(), false), get("/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
    assert_eq!(body["availableEndpoints"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_post_mailbox_without_content_type() {
    let request = Request::builder()
        .method("POST")
        .uri("/mailbox")
        .body(Body::from(r#"{"user":"bob"}"#))
        .unwrap();

    let (status, body) = send(app(MockTransport::new(), false), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");
}

#[tokio::test]
async fn test_batch_without_content_type() {
    let request = Request::builder()
        .method("POST")
        .uri("/mailbox/batch")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(app(MockTransport::new(), false), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
}

#[tokio::test]
async fn test_malformed_json_body() {
    for uri in ["/mailbox", "/mailbox/batch"] {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(app(MockTransport::new(), false), request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", uri);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Internal server error");
    }
}
