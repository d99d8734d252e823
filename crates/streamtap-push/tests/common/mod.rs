#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use streamtap_push::signature::sign;
use streamtap_push::{HubClient, HubError, HubMode, HubRequest, NotificationHandler};
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Hub double recording every request.
#[derive(Default)]
pub struct FakeHub {
    pub requests: Mutex<Vec<HubRequest>>,
    /// Topics (substring match) refused as unauthorized.
    pub rejected_topics: Mutex<HashSet<String>>,
    /// Number of upcoming subscribe requests that fail.
    pub failing_subscribes: AtomicUsize,
}

impl FakeHub {
    pub fn requests(&self, mode: HubMode) -> Vec<HubRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.mode == mode)
            .cloned()
            .collect()
    }

    pub fn last_subscribe(&self) -> HubRequest {
        self.requests(HubMode::Subscribe)
            .pop()
            .expect("no subscribe request was sent")
    }

    pub fn reject(&self, topic_fragment: &str) {
        self.rejected_topics
            .lock()
            .unwrap()
            .insert(topic_fragment.to_string());
    }
}

#[async_trait]
impl HubClient for FakeHub {
    async fn send(&self, request: &HubRequest) -> Result<(), HubError> {
        self.requests.lock().unwrap().push(request.clone());
        if request.mode == HubMode::Subscribe {
            let rejected = self
                .rejected_topics
                .lock()
                .unwrap()
                .iter()
                .any(|fragment| request.topic.contains(fragment.as_str()));
            if rejected {
                return Err(HubError::Rejected("missing authorization".to_string()));
            }
            let failing = self
                .failing_subscribes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(HubError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Forwards every notification to a channel.
pub struct Recorder(pub mpsc::UnboundedSender<Option<Value>>);

#[async_trait]
impl NotificationHandler for Recorder {
    async fn handle(&self, data: Option<Value>) {
        let _ = self.0.send(data);
    }
}

/// Id segment of a callback URL.
pub fn id_of(request: &HubRequest) -> String {
    request
        .callback
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

pub async fn post(app: &Router, uri: &str, signature: Option<&str>, body: &str) -> StatusCode {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header("x-hub-signature", signature);
    }
    app.clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
        .status()
}

/// Posts `body` signed with the secret of `request`.
pub async fn post_signed(app: &Router, uri: &str, request: &HubRequest, body: &str) -> StatusCode {
    let signature = sign(&request.secret, body.as_bytes());
    post(app, uri, Some(&signature), body).await
}
