//! HTTP surface of the bot.
//!
//! - `POST /webhook` accepts GitHub webhook deliveries, verifies signatures,
//!   and routes typed events to per-key workers (202 Accepted).
//! - `GET /health` answers liveness probes.

use std::sync::Arc;

pub mod signature;
pub mod webhook;

pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
};
pub use webhook::webhook_handler;

use crate::worker::{EventRouter, EventSink};

/// Shared application state, handed to handlers via axum's `State`.
pub struct AppState<S> {
    inner: Arc<AppStateInner<S>>,
}

struct AppStateInner<S> {
    /// Routes accepted events to per-key workers.
    router: EventRouter<S>,

    /// Webhook secret for HMAC-SHA256 signature verification.
    webhook_secret: Vec<u8>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: EventSink> AppState<S> {
    pub fn new(router: EventRouter<S>, webhook_secret: impl Into<Vec<u8>>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                router,
                webhook_secret: webhook_secret.into(),
            }),
        }
    }

    pub fn router(&self) -> &EventRouter<S> {
        &self.inner.router
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }
}

/// Builds the axum router with all endpoints.
pub fn build_router<S: EventSink>(app_state: AppState<S>) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler::<S>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

/// Liveness probe.
pub async fn health_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::dispatch::events::{Event, PullAction};
    use crate::types::PullNumber;

    struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            RecordingSink {
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        async fn deliver(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn test_app(secret: &[u8]) -> (axum::Router, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let router = EventRouter::new(Arc::clone(&sink));
        let app = build_router(AppState::new(router, secret.to_vec()));
        (app, sink)
    }

    fn webhook_request(
        secret: &[u8],
        event_type: &str,
        delivery_id: &str,
        body: &serde_json::Value,
    ) -> Request<Body> {
        let body_bytes = serde_json::to_vec(body).unwrap();
        let signature = compute_signature(&body_bytes, secret);

        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("x-github-event", event_type)
            .header("x-github-delivery", delivery_id)
            .header("x-hub-signature-256", format_signature_header(&signature))
            .body(Body::from(body_bytes))
            .unwrap()
    }

    fn opened_payload() -> serde_json::Value {
        serde_json::json!({
            "action": "opened",
            "pull_request": {
                "number": 42,
                "state": "open",
                "merged": false,
                "base": { "ref": "main", "sha": "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb" },
                "head": { "ref": "feature", "sha": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" }
            },
            "repository": {
                "name": "hello",
                "owner": { "login": "octocat" }
            }
        })
    }

    async fn wait_for_events(sink: &RecordingSink, count: usize) -> Vec<Event> {
        for _ in 0..500 {
            let events = sink.events();
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {count} events, got {:?}", sink.events());
    }

    #[tokio::test]
    async fn health_returns_200() {
        let (app, _) = test_app(b"secret");

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn valid_webhook_is_routed_and_acknowledged() {
        let secret = b"test-secret";
        let (app, sink) = test_app(secret);

        let request = webhook_request(
            secret,
            "pull_request",
            "550e8400-e29b-41d4-a716-446655440000",
            &opened_payload(),
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let events = wait_for_events(&sink, 1).await;
        match &events[0] {
            Event::PullRequest(e) => {
                assert_eq!(e.action, PullAction::Opened);
                assert_eq!(e.pull.number, PullNumber(42));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_signature_returns_401_and_routes_nothing() {
        let (app, sink) = test_app(b"correct-secret");

        let request = webhook_request(
            b"wrong-secret",
            "pull_request",
            "550e8400-e29b-41d4-a716-446655440001",
            &opened_payload(),
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn missing_event_header_returns_400() {
        let secret = b"test-secret";
        let (app, _) = test_app(secret);

        let body = opened_payload();
        let body_bytes = serde_json::to_vec(&body).unwrap();
        let signature = compute_signature(&body_bytes, secret);

        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("x-github-delivery", "550e8400-e29b-41d4-a716-446655440002")
            .header("x-hub-signature-256", format_signature_header(&signature))
            .body(Body::from(body_bytes))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unconsumed_event_type_is_acknowledged_but_dropped() {
        let secret = b"test-secret";
        let (app, sink) = test_app(secret);

        let body = serde_json::json!({
            "action": "created",
            "repository": {
                "name": "hello",
                "owner": { "login": "octocat" }
            }
        });
        let request = webhook_request(secret, "fork", "550e8400-e29b-41d4-a716-446655440003", &body);
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn missing_repository_returns_400() {
        let secret = b"test-secret";
        let (app, _) = test_app(secret);

        let body = serde_json::json!({ "action": "opened" });
        let request =
            webhook_request(secret, "pull_request", "550e8400-e29b-41d4-a716-446655440004", &body);
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
