//! Per-key event workers.
//!
//! The dispatcher assumes events for one queue key are processed serially;
//! the [`EventRouter`] enforces that. Each route gets a dedicated worker task
//! fed by an mpsc channel: events on one route are delivered strictly in
//! order, while distinct routes process concurrently. Workers are spawned
//! lazily on first use and wound down together via a cancellation token.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::cache::SnapshotCache;
use crate::dispatch::{BackportTrigger, EventDispatcher};
use crate::dispatch::events::Event;
use crate::host::HostClient;
use crate::hydrate::Hydrator;
use crate::policy::PolicyLoader;

/// Per-worker channel depth; senders wait when a route falls this far behind.
const WORKER_QUEUE_DEPTH: usize = 128;

/// Consumes routed events. One delivery at a time per route.
pub trait EventSink: Send + Sync + 'static {
    fn deliver(&self, event: Event) -> impl Future<Output = ()> + Send;
}

/// The dispatcher is the production sink; failures end with the event (the
/// soft-failure policy already absorbed everything recoverable).
impl<C, H, F, P, B> EventSink for EventDispatcher<C, H, F, P, B>
where
    C: SnapshotCache + 'static,
    H: HostClient + 'static,
    F: Hydrator + 'static,
    P: PolicyLoader + 'static,
    B: BackportTrigger + 'static,
{
    async fn deliver(&self, event: Event) {
        if let Err(error) = self.handle(event).await {
            error!(%error, "event processing failed");
        }
    }
}

/// Routes events to per-key worker tasks.
pub struct EventRouter<S> {
    sink: Arc<S>,
    workers: Mutex<HashMap<String, mpsc::Sender<Event>>>,
    tasks: Mutex<JoinSet<()>>,
    shutdown: CancellationToken,
}

impl<S: EventSink> EventRouter<S> {
    pub fn new(sink: Arc<S>) -> Self {
        EventRouter {
            sink,
            workers: Mutex::new(HashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Enqueues `event` on `route`'s worker, spawning it on first use.
    ///
    /// Waits for channel capacity rather than dropping; backpressure
    /// propagates to the webhook handler.
    pub async fn dispatch(&self, route: &str, event: Event) {
        if self.shutdown.is_cancelled() {
            warn!(route, "router is shut down, event dropped");
            return;
        }

        let tx = {
            let mut workers = self.workers.lock().await;
            match workers.get(route) {
                Some(tx) if !tx.is_closed() => tx.clone(),
                _ => {
                    let tx = self.spawn_worker(route).await;
                    workers.insert(route.to_string(), tx.clone());
                    tx
                }
            }
        };

        if tx.send(event).await.is_err() {
            // Worker exited between lookup and send (shutdown race).
            warn!(route, "worker gone, event dropped");
        }
    }

    async fn spawn_worker(&self, route: &str) -> mpsc::Sender<Event> {
        let (tx, mut rx) = mpsc::channel::<Event>(WORKER_QUEUE_DEPTH);
        let sink = Arc::clone(&self.sink);
        let shutdown = self.shutdown.clone();
        let route = route.to_string();

        self.tasks.lock().await.spawn(async move {
            debug!(route, "worker started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = rx.recv() => match received {
                        Some(event) => sink.deliver(event).await,
                        None => break,
                    },
                }
            }
            debug!(route, "worker stopped");
        });

        tx
    }

    /// Stops all workers and waits for them to finish their current event.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.workers.lock().await.clear();
        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }
}
