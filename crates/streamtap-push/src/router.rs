//! Inbound callback endpoints: `GET /{id}` answers the hub's challenge,
//! `POST /{id}` receives signed notifications.
//!
//! Anything that does not match a live subscription, including a bad
//! signature, gets the same `404` an unknown path would.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::manager::{ManagerInner, SubscriptionManager};
use crate::signature::{verify_signature, SIGNATURE_HEADER};

impl SubscriptionManager {
    /// Router serving every subscription of this manager at `/{id}`.
    ///
    /// Mount it (or [`nest`](Router::nest) it) at the path of the callback
    /// base URL.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/{id}", get(verify_challenge).post(receive_notification))
            .layer(TraceLayer::new_for_http())
            .layer(Extension(self.inner.clone()))
    }
}

/// Handler for `GET /{id}`.
async fn verify_challenge(
    Extension(manager): Extension<Arc<ManagerInner>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let denied_topic = {
        let mut registry = manager.registry();
        let Some(entry) = registry.get_mut(&id) else {
            return StatusCode::NOT_FOUND.into_response();
        };
        if params.get("hub.mode").map(String::as_str) == Some("denied") {
            entry.denied = true;
            Some(entry.topic.clone())
        } else {
            None
        }
    };

    if let Some(topic) = denied_topic {
        let reason = params
            .get("hub.reason")
            .map(String::as_str)
            .unwrap_or("no reason given");
        manager
            .emitter
            .warn(format!("The hub denied the push subscription to {topic}: {reason}"));
        return StatusCode::OK.into_response();
    }

    match params.get("hub.challenge") {
        Some(challenge) => (StatusCode::OK, challenge.clone()).into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// Handler for `POST /{id}`. Acknowledges before the handler runs.
async fn receive_notification(
    Extension(manager): Extension<Arc<ManagerInner>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return StatusCode::NOT_FOUND;
    };

    let handler = {
        let registry = manager.registry();
        match registry.get(&id) {
            Some(entry) if !entry.denied && verify_signature(&entry.secret, signature, &body) => {
                entry.handler.clone()
            }
            _ => return StatusCode::NOT_FOUND,
        }
    };

    let data = first_item(&body);
    tokio::spawn(async move { handler.handle(data).await });
    StatusCode::OK
}

/// `data[0]` of a notification body.
fn first_item(body: &[u8]) -> Option<Value> {
    let mut payload: Value = serde_json::from_slice(body).ok()?;
    payload
        .get_mut("data")?
        .as_array_mut()?
        .first_mut()
        .map(Value::take)
}
