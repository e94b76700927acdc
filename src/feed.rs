//! Change feed: a cancellable stream of full-collection snapshots.
//!
//! The producer side ([`FeedSender`]) is driven either by the polling
//! subscription in this module or by a backend with its own push channel.
//! The consumer side ([`ChangeFeed`]) never yields an event once `close()`
//! has returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::BackendError;
use crate::models::{Priority, Task, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Every live task, in backend order (`createdAt` descending).
    Snapshot(Vec<Task>),
    /// The subscription itself failed. No partial snapshot accompanies it.
    Error(String),
}

/// A document as read from the backend, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTaskDocument {
    pub id: String,
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawTaskDocument {
    pub fn into_task(self) -> Task {
        let completed = self.completed.unwrap_or(false);

        let priority = match self.priority.as_deref() {
            None => Priority::Medium,
            Some(raw) => Priority::parse(raw).unwrap_or_else(|| {
                debug!("task {} has unknown priority {:?}, using medium", self.id, raw);
                Priority::Medium
            }),
        };

        // `completed` is written on every record, `status` only by newer
        // clients, so `completed` decides when the two disagree.
        let status = match self.status.as_deref().and_then(TaskStatus::parse) {
            Some(status) if (status == TaskStatus::Done) == completed => status,
            _ => TaskStatus::from_completed(completed),
        };

        let updated_at = self.updated_at.or(self.created_at).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let created_at = self.created_at.unwrap_or(updated_at);

        Task {
            id: self.id,
            title: self.title.unwrap_or_default(),
            completed,
            status,
            priority,
            created_at,
            updated_at,
        }
    }
}

pub fn channel() -> (FeedSender, ChangeFeed) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let sender = FeedSender {
        tx,
        closed: closed.clone(),
    };
    let feed = ChangeFeed {
        rx,
        closed,
        producer: None,
    };
    (sender, feed)
}

#[derive(Clone)]
pub struct FeedSender {
    tx: mpsc::UnboundedSender<FeedEvent>,
    closed: Arc<AtomicBool>,
}

impl FeedSender {
    /// Returns `false` once the consumer has closed the feed.
    pub fn send(&self, event: FeedEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    pub fn snapshot(&self, docs: Vec<RawTaskDocument>) -> bool {
        self.send(FeedEvent::Snapshot(
            docs.into_iter().map(RawTaskDocument::into_task).collect(),
        ))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(FeedEvent::Error(message.into()))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

pub struct ChangeFeed {
    rx: mpsc::UnboundedReceiver<FeedEvent>,
    closed: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl ChangeFeed {
    /// Ties a producer task to this feed; it is aborted on close.
    pub fn with_producer(mut self, producer: JoinHandle<()>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Waits for the next event. Returns `None` after `close()` or when the
    /// producer has gone away.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        if self.is_closed() {
            return None;
        }
        let event = self.rx.recv().await?;
        if self.is_closed() {
            return None;
        }
        Some(event)
    }

    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.rx.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.close();
    }
}

/// Anything that can list the whole collection on demand.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    /// Documents ordered by `createdAt` descending.
    async fn fetch_documents(&self) -> Result<Vec<RawTaskDocument>, BackendError>;
}

/// Subscribes by polling `source` every `interval`.
///
/// The first successful poll is always delivered; after that a snapshot is
/// only delivered when it differs from the previous one. A failed poll
/// delivers an error unless it repeats the last one, and the next success
/// after a failure is always delivered.
pub fn spawn_polling<S>(source: Arc<S>, interval: Duration) -> ChangeFeed
where
    S: SnapshotSource,
{
    let (sender, feed) = channel();
    let producer = tokio::spawn(poll_loop(source, sender, interval));
    feed.with_producer(producer)
}

async fn poll_loop<S>(source: Arc<S>, sender: FeedSender, interval: Duration)
where
    S: SnapshotSource,
{
    info!("Starting change feed poller (interval: {:?})", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_snapshot: Option<Vec<Task>> = None;
    let mut last_error: Option<String> = None;

    loop {
        ticker.tick().await;
        if sender.is_closed() {
            break;
        }

        match source.fetch_documents().await {
            Ok(docs) => {
                let tasks: Vec<Task> = docs.into_iter().map(RawTaskDocument::into_task).collect();
                if last_error.is_none() && last_snapshot.as_ref() == Some(&tasks) {
                    continue;
                }
                if !sender.send(FeedEvent::Snapshot(tasks.clone())) {
                    break;
                }
                last_snapshot = Some(tasks);
                last_error = None;
            }
            Err(e) => {
                let message = e.to_string();
                if last_error.as_deref() == Some(message.as_str()) {
                    continue;
                }
                warn!("Change feed poll failed: {}", message);
                if !sender.send(FeedEvent::Error(message.clone())) {
                    break;
                }
                last_error = Some(message);
            }
        }
    }

    debug!("Change feed poller stopped");
}
