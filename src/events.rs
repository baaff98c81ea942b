//! Publish/subscribe hub for job events
//!
//! Every observer registered on an [`EventChannel`] receives every event
//! published after it subscribed, in publish order. Nothing is replayed to late
//! subscribers. Publishing never waits: each subscriber has a bounded buffer and
//! an observer that lets it fill up is disconnected instead of slowing the
//! download pipeline down.

use futures_util::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::core::metrics;
use crate::core::types::{Job, JobId};
use crate::download::progress::ProgressEvent;

pub type SubscriberId = u64;

/// Event kinds fanned out to observers
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Full job snapshot, sent when a job reaches a terminal status
    Lifecycle(Job),
    /// Latest progress fragment of a running job
    Progress(ProgressEvent),
}

impl ChannelEvent {
    /// Event name used on the wire (`event:` field of SSE)
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::Lifecycle(_) => "lifecycle",
            ChannelEvent::Progress(_) => "progress",
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            ChannelEvent::Lifecycle(job) => job.id,
            ChannelEvent::Progress(progress) => progress.job_id,
        }
    }

    /// JSON payload of the event
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        match self {
            ChannelEvent::Lifecycle(job) => serde_json::to_string(job),
            ChannelEvent::Progress(progress) => serde_json::to_string(progress),
        }
    }
}

struct Registry {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<ChannelEvent>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<ChannelEvent>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Event registry lock was poisoned, recovering...");
                poisoned.into_inner()
            }
        }
    }

    fn remove(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.lock();
        let removed = subscribers.remove(&id).is_some();
        metrics::EVENT_SUBSCRIBERS.set(subscribers.len() as i64);
        removed
    }
}

/// Concurrency-safe subscriber registry with add/remove/broadcast
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<Registry>,
}

impl EventChannel {
    /// Creates a channel whose subscribers buffer up to `capacity` events each
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Registry {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Registers a new observer
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);

        let mut subscribers = self.inner.lock();
        subscribers.insert(id, tx);
        metrics::EVENT_SUBSCRIBERS.set(subscribers.len() as i64);
        drop(subscribers);

        log::debug!("Event subscriber {} registered", id);
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Removes an observer; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Delivers `event` to every current subscriber without waiting.
    ///
    /// Returns how many subscribers accepted it. Subscribers whose buffer is
    /// full or whose receiver is gone are dropped from the registry.
    pub fn publish(&self, event: ChannelEvent) -> usize {
        // The lock is held for the whole fan-out so concurrent publishers
        // cannot interleave: every subscriber observes one global order.
        let mut subscribers = self.inner.lock();
        let mut delivered = 0;
        let mut dropped = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "Event subscriber {} is not keeping up, disconnecting it (event: {}, job: {})",
                        id,
                        event.name(),
                        event.job_id()
                    );
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => dropped.push(*id),
            }
        }

        for id in dropped {
            subscribers.remove(&id);
        }
        metrics::EVENT_SUBSCRIBERS.set(subscribers.len() as i64);
        delivered
    }

    pub fn publish_lifecycle(&self, job: &Job) -> usize {
        self.publish(ChannelEvent::Lifecycle(job.clone()))
    }

    pub fn publish_progress(&self, progress: ProgressEvent) -> usize {
        metrics::PROGRESS_EVENTS_TOTAL.inc();
        self.publish(ChannelEvent::Progress(progress))
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(crate::core::config::events::DEFAULT_CAPACITY)
    }
}

/// Receiving side of one observer; unregisters itself when dropped
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<ChannelEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event, or `None` once the subscriber has been disconnected
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    /// Next already-buffered event, if any
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = ChannelEvent> + Send + 'static {
        futures_util::stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|event| (event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                log::debug!("Event subscriber {} unregistered", self.id);
            }
        }
    }
}
