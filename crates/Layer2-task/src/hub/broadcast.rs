//! Broadcast Hub - fans messages out to live observers
//!
//! Each observer owns a bounded FIFO queue drained by its own writer task.
//! Enqueueing happens under the membership lock, so every observer sees
//! messages in the order `broadcast`/`send_personal` were invoked. Delivery
//! itself runs outside the lock; a failed or timed-out send removes only
//! that observer.

use super::sink::ObserverSink;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tasktrack_foundation::HubConfig;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

// ============================================================================
// Observer identity
// ============================================================================

/// Opaque handle for a connected observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

struct Outbound {
    message: Arc<str>,
    ack: oneshot::Sender<bool>,
}

struct ObserverEntry {
    name: String,
    tx: mpsc::Sender<Outbound>,
}

impl ObserverEntry {
    /// Queue one message; `None` if the queue is full or the writer is gone
    fn enqueue(&self, message: &Arc<str>) -> Option<oneshot::Receiver<bool>> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .try_send(Outbound {
                message: Arc::clone(message),
                ack,
            })
            .ok()
            .map(|_| rx)
    }
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Observers that acknowledged the message
    pub delivered: usize,

    /// Observers removed because delivery failed
    pub dropped: Vec<ObserverId>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.dropped.len()
    }
}

// ============================================================================
// BroadcastHub
// ============================================================================

struct HubInner {
    observers: Mutex<HashMap<ObserverId, ObserverEntry>>,
    next_id: AtomicU64,
    send_timeout: Duration,
    queue_capacity: usize,
}

impl HubInner {
    /// Idempotent removal
    fn remove(&self, id: ObserverId, reason: &str) -> bool {
        let removed = self.observers.lock().remove(&id);
        match removed {
            Some(entry) => {
                info!(observer = %id, name = %entry.name, reason, "Observer disconnected");
                true
            }
            None => false,
        }
    }
}

/// Registry of live observers
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                observers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                send_timeout: config.send_timeout(),
                queue_capacity: config.observer_queue_capacity.max(1),
            }),
        }
    }

    /// Register a sink; it receives only messages sent from now on
    ///
    /// Must be called from within a tokio runtime (spawns the writer task).
    pub fn connect(&self, sink: Arc<dyn ObserverSink>) -> ObserverId {
        let id = ObserverId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);
        let name = sink.name().to_string();

        tokio::spawn(run_writer(
            id,
            sink,
            rx,
            Arc::downgrade(&self.inner),
            self.inner.send_timeout,
        ));

        self.inner.observers.lock().insert(
            id,
            ObserverEntry {
                name: name.clone(),
                tx,
            },
        );

        info!(observer = %id, name = %name, "Observer connected");
        id
    }

    /// Remove an observer; `false` if it was already gone
    pub fn disconnect(&self, id: ObserverId) -> bool {
        self.inner.remove(id, "disconnect requested")
    }

    pub fn is_connected(&self, id: ObserverId) -> bool {
        self.inner.observers.lock().contains_key(&id)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Deliver to exactly one observer
    ///
    /// Returns whether it was delivered. On failure the observer is
    /// disconnected; the failure itself is not reported to the producer.
    pub async fn send_personal(&self, id: ObserverId, message: &Value) -> bool {
        let Some(text) = serialize(message) else {
            return false;
        };

        let ack = {
            let observers = self.inner.observers.lock();
            match observers.get(&id) {
                Some(entry) => entry.enqueue(&text),
                None => {
                    debug!(observer = %id, "Personal message for unknown observer");
                    return false;
                }
            }
        };

        let delivered = match ack {
            Some(rx) => rx.await.unwrap_or(false),
            None => false,
        };

        if !delivered {
            self.inner.remove(id, "personal delivery failed");
        }
        delivered
    }

    /// Deliver to every registered observer independently
    pub async fn broadcast(&self, message: &Value) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let Some(text) = serialize(message) else {
            return report;
        };

        let mut queued = Vec::new();
        let mut rejected = Vec::new();
        {
            let observers = self.inner.observers.lock();
            for (id, entry) in observers.iter() {
                match entry.enqueue(&text) {
                    Some(rx) => queued.push((*id, rx)),
                    None => rejected.push(*id),
                }
            }
        }

        for id in rejected {
            self.inner.remove(id, "queue full or closed");
            report.dropped.push(id);
        }

        let acks = join_all(
            queued
                .into_iter()
                .map(|(id, rx)| async move { (id, rx.await.unwrap_or(false)) }),
        )
        .await;

        for (id, delivered) in acks {
            if delivered {
                report.delivered += 1;
            } else {
                self.inner.remove(id, "delivery failed");
                report.dropped.push(id);
            }
        }

        report.dropped.sort();
        debug!(
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Broadcast finished"
        );
        report
    }
}

fn serialize(message: &Value) -> Option<Arc<str>> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            warn!(error = %e, "Dropping unserializable message");
            None
        }
    }
}

/// Drains one observer's queue into its sink until a send fails
async fn run_writer(
    id: ObserverId,
    sink: Arc<dyn ObserverSink>,
    mut rx: mpsc::Receiver<Outbound>,
    hub: Weak<HubInner>,
    send_timeout: Duration,
) {
    while let Some(outbound) = rx.recv().await {
        let delivered = match tokio::time::timeout(send_timeout, sink.send(&outbound.message)).await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(observer = %id, error = %e, "Delivery failed");
                false
            }
            Err(_) => {
                warn!(
                    observer = %id,
                    timeout_ms = send_timeout.as_millis() as u64,
                    "Delivery timed out"
                );
                false
            }
        };

        let _ = outbound.ack.send(delivered);

        if !delivered {
            if let Some(hub) = hub.upgrade() {
                hub.remove(id, "delivery failed");
            }
            break;
        }
    }

    // Anything still queued is dropped; its acks resolve as failures
    debug!(observer = %id, "Observer writer stopped");
}
