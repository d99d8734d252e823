use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use streamtap_helix::{ChannelDirectory, CredentialProvider, HelixClient, ViewerResolver};
use tokio::net::TcpListener;

#[derive(Default)]
struct FakeApi {
    token_requests: AtomicUsize,
    reject_next_call: std::sync::atomic::AtomicBool,
}

async fn token_handler(
    State(api): State<Arc<FakeApi>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if params.get("client_secret").map(String::as_str) != Some("secret") {
        return Err(StatusCode::BAD_REQUEST);
    }
    let n = api.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(Json(json!({
        "access_token": format!("token-{n}"),
        "expires_in": 3600,
        "token_type": "bearer"
    })))
}

fn authorized(headers: &HeaderMap) -> bool {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let client_id = headers
        .get("client-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    bearer.starts_with("Bearer token-") && client_id == "client"
}

async fn users_handler(
    State(api): State<Arc<FakeApi>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if api.reject_next_call.swap(false, Ordering::SeqCst) || !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let found = params.get("login").map(String::as_str) == Some("some_streamer")
        || params.get("id").map(String::as_str) == Some("1234");
    let data = if found {
        vec![json!({
            "id": "1234",
            "login": "some_streamer",
            "display_name": "Some_Streamer",
            "type": "",
            "broadcaster_type": "affiliate"
        })]
    } else {
        vec![]
    };
    Ok(Json(json!({ "data": data })))
}

async fn channels_handler(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let id = params.get("broadcaster_id").cloned().unwrap_or_default();
    Ok(Json(json!({
        "data": [{
            "broadcaster_id": id,
            "game_id": "509658",
            "game_name": "Just Chatting",
            "title": "hello"
        }]
    })))
}

async fn spawn_api() -> (Arc<FakeApi>, String) {
    let api = Arc::new(FakeApi::default());
    let app = Router::new()
        .route("/oauth2/token", post(token_handler))
        .route("/helix/users", get(users_handler))
        .route("/helix/channels", get(channels_handler))
        .with_state(api.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (api, format!("http://{addr}"))
}

fn client(base: &str, secret: &str) -> HelixClient {
    HelixClient::with_urls(
        "client",
        secret,
        format!("{base}/helix"),
        format!("{base}/oauth2/token"),
    )
}

#[tokio::test]
async fn resolves_viewer_by_normalized_name() {
    let (_api, base) = spawn_api().await;
    let helix = client(&base, "secret");

    let viewer = helix
        .viewer_by_name("Some Streamer")
        .await
        .expect("lookup should succeed")
        .expect("viewer should exist");

    assert_eq!(viewer.id, "1234");
    assert_eq!(viewer.display_name, "Some_Streamer");
}

#[tokio::test]
async fn unknown_viewer_is_none() {
    let (_api, base) = spawn_api().await;
    let helix = client(&base, "secret");

    assert!(helix.viewer_by_name("nobody").await.unwrap().is_none());
    assert!(helix.viewer_by_id("").await.unwrap().is_none());
}

#[tokio::test]
async fn token_is_cached_between_calls() {
    let (api, base) = spawn_api().await;
    let helix = client(&base, "secret");

    helix.viewer_by_id("1234").await.unwrap();
    helix.viewer_by_name("some_streamer").await.unwrap();

    assert_eq!(api.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unauthorized_call_refreshes_token_once() {
    let (api, base) = spawn_api().await;
    let helix = client(&base, "secret");
    helix.access_token().await.unwrap();
    api.reject_next_call.store(true, Ordering::SeqCst);

    let viewer = helix.viewer_by_id("1234").await.unwrap();

    assert!(viewer.is_some());
    assert_eq!(api.token_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn bad_credentials_surface_as_unauthorized() {
    let (_api, base) = spawn_api().await;
    let helix = client(&base, "wrong");

    let err = helix.access_token().await.unwrap_err();
    assert!(matches!(err, streamtap_helix::HelixError::Unauthorized(_)));
}

#[tokio::test]
async fn channel_info_maps_game_fields() {
    let (_api, base) = spawn_api().await;
    let helix = client(&base, "secret");

    let info = helix.channel_info("1234").await.unwrap().unwrap();

    assert_eq!(info.broadcaster_id, "1234");
    assert_eq!(info.category_id, "509658");
    assert_eq!(info.category_name, "Just Chatting");
    assert_eq!(info.title, "hello");
}
