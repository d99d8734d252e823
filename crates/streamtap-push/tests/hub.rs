use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use streamtap_helix::{CredentialProvider, HelixError};
use streamtap_push::{HelixHub, HubClient, HubError, HubMode, HubRequest};
use tokio::net::TcpListener;

struct StaticCredentials(&'static str);

#[async_trait]
impl CredentialProvider for StaticCredentials {
    fn client_id(&self) -> &str {
        "client"
    }

    async fn access_token(&self) -> Result<String, HelixError> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
struct Received {
    bodies: Mutex<Vec<Value>>,
}

async fn hub_handler(
    State(received): State<Arc<Received>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let client_id = headers
        .get("client-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if bearer != "Bearer token" || client_id != "client" {
        return StatusCode::UNAUTHORIZED;
    }
    let topic = body["hub.topic"].as_str().unwrap_or_default().to_string();
    received.bodies.lock().unwrap().push(body);
    if topic.contains("forbidden") {
        StatusCode::FORBIDDEN
    } else if topic.contains("broken") {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::ACCEPTED
    }
}

async fn spawn_hub() -> (String, Arc<Received>) {
    let received = Arc::new(Received::default());
    let app = Router::new()
        .route("/hub", post(hub_handler))
        .with_state(received.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hub"), received)
}

fn request(topic: &str, mode: HubMode) -> HubRequest {
    HubRequest {
        callback: "https://example.org/hooks/abc".to_string(),
        mode,
        topic: topic.to_string(),
        lease_seconds: 864_000,
        secret: "s3cret".to_string(),
    }
}

#[tokio::test]
async fn posts_hub_fields_with_credentials() {
    let (url, received) = spawn_hub().await;
    let hub = HelixHub::new(url, Arc::new(StaticCredentials("token")));

    hub.send(&request("https://api.example/helix/channel.follow", HubMode::Subscribe))
        .await
        .unwrap();
    hub.send(&request("https://api.example/helix/channel.follow", HubMode::Unsubscribe))
        .await
        .unwrap();

    let bodies = received.bodies.lock().unwrap();
    assert_eq!(
        bodies[0],
        json!({
            "hub.callback": "https://example.org/hooks/abc",
            "hub.mode": "subscribe",
            "hub.topic": "https://api.example/helix/channel.follow",
            "hub.lease_seconds": 864_000,
            "hub.secret": "s3cret"
        })
    );
    assert_eq!(bodies[1]["hub.mode"], "unsubscribe");
}

#[tokio::test]
async fn forbidden_is_a_rejection() {
    let (url, _received) = spawn_hub().await;
    let hub = HelixHub::new(url, Arc::new(StaticCredentials("token")));

    let err = hub
        .send(&request("forbidden-topic", HubMode::Subscribe))
        .await
        .unwrap_err();

    assert!(err.is_rejection());
}

#[tokio::test]
async fn server_error_is_not_a_rejection() {
    let (url, _received) = spawn_hub().await;
    let hub = HelixHub::new(url, Arc::new(StaticCredentials("token")));

    let err = hub
        .send(&request("broken-topic", HubMode::Subscribe))
        .await
        .unwrap_err();

    assert!(!err.is_rejection());
    assert!(matches!(err, HubError::Status { status: 500, .. }));
}

#[tokio::test]
async fn bad_credentials_are_not_a_rejection() {
    let (url, received) = spawn_hub().await;
    let hub = HelixHub::new(url, Arc::new(StaticCredentials("expired")));

    let err = hub
        .send(&request("https://api.example/helix/channel.follow", HubMode::Subscribe))
        .await
        .unwrap_err();

    assert!(!err.is_rejection());
    assert!(matches!(err, HubError::Status { status: 401, .. }));
    assert!(received.bodies.lock().unwrap().is_empty());
}

#[test]
fn debug_output_hides_the_secret() {
    let rendered = format!("{:?}", request("topic", HubMode::Subscribe));
    assert!(!rendered.contains("s3cret"));
    assert!(rendered.contains("[REDACTED]"));
}
