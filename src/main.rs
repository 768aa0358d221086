use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use merge_queue::dispatch::events::Event;
use merge_queue::server::{AppState, build_router};
use merge_queue::worker::{EventRouter, EventSink};

/// Acknowledges routed events with a log line.
///
/// Hydration and policy loading are deployment-specific, so the binary ships
/// without a wired `EventDispatcher`; embedders replace this sink with their
/// dispatcher.
struct LogSink;

impl EventSink for LogSink {
    async fn deliver(&self, event: Event) {
        info!(kind = %event.kind(), event = %event.describe(), "event received");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "merge_queue=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let webhook_secret = std::env::var("MERGE_QUEUE_WEBHOOK_SECRET")
        .expect("MERGE_QUEUE_WEBHOOK_SECRET must be set");

    let router = EventRouter::new(Arc::new(LogSink));
    let app = build_router(AppState::new(router, webhook_secret.into_bytes()));

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
