#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tasklist::backend::{BackendError, NewTaskDocument, RemoteBackend};
use tasklist::feed::{self, ChangeFeed, FeedSender, RawTaskDocument};
use tasklist::models::TaskPatch;
use tasklist::store::{TaskSnapshot, TaskStore};
use tokio::sync::watch;

/// Write recorded by [`FakeRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Create(NewTaskDocument),
    Update(String, TaskPatch),
    Delete(String),
}

/// In-memory document store with a hand-driven change feed.
///
/// With `auto_publish` on, every successful write publishes a fresh snapshot
/// the way a real backend listener would.
#[derive(Clone, Default)]
pub struct FakeRemote {
    inner: Arc<FakeInner>,
}

#[derive(Default)]
struct FakeInner {
    docs: Mutex<Vec<RawTaskDocument>>,
    sender: Mutex<Option<FeedSender>>,
    writes: Mutex<Vec<Recorded>>,
    fail_writes: AtomicBool,
    auto_publish: AtomicBool,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publishing() -> Self {
        let fake = Self::default();
        fake.inner.auto_publish.store(true, Ordering::SeqCst);
        fake
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<Recorded> {
        self.inner.writes.lock().unwrap().clone()
    }

    pub fn feed_sender(&self) -> FeedSender {
        self.inner
            .sender
            .lock()
            .unwrap()
            .clone()
            .expect("store has not subscribed yet")
    }

    pub fn push_docs(&self, docs: Vec<RawTaskDocument>) -> bool {
        self.feed_sender().snapshot(docs)
    }

    pub fn push_error(&self, message: &str) -> bool {
        self.feed_sender().error(message)
    }

    /// Puts documents into the collection without notifying the feed.
    pub fn store_docs(&self, docs: Vec<RawTaskDocument>) {
        self.inner.docs.lock().unwrap().extend(docs);
    }

    /// Puts documents into the collection and publishes it.
    pub fn seed(&self, docs: Vec<RawTaskDocument>) -> bool {
        self.store_docs(docs);
        self.publish()
    }

    /// Drops the only producer handle, ending the feed from the backend side.
    pub fn end_feed(&self) {
        self.inner.sender.lock().unwrap().take();
    }

    /// Sends the current collection, newest first.
    pub fn publish(&self) -> bool {
        let mut docs = self.inner.docs.lock().unwrap().clone();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.push_docs(docs)
    }

    fn record(&self, write: Recorded) -> Result<(), BackendError> {
        self.inner.writes.lock().unwrap().push(write);
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 403,
                message: "Missing or insufficient permissions.".to_string(),
            });
        }
        Ok(())
    }

    fn after_write(&self) {
        if self.inner.auto_publish.load(Ordering::SeqCst) {
            self.publish();
        }
    }
}

#[async_trait]
impl RemoteBackend for FakeRemote {
    fn subscribe(&self) -> ChangeFeed {
        let (sender, feed) = feed::channel();
        *self.inner.sender.lock().unwrap() = Some(sender);
        feed
    }

    async fn create_task(&self, doc: &NewTaskDocument) -> Result<(), BackendError> {
        self.record(Recorded::Create(doc.clone()))?;
        let now = Utc::now();
        self.inner.docs.lock().unwrap().push(RawTaskDocument {
            id: doc.id.clone(),
            title: Some(doc.title.clone()),
            completed: Some(doc.completed),
            priority: Some(doc.priority.as_str().to_string()),
            status: Some(doc.status.as_str().to_string()),
            created_at: Some(now),
            updated_at: Some(now),
        });
        self.after_write();
        Ok(())
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<(), BackendError> {
        self.record(Recorded::Update(id.to_string(), patch.clone()))?;
        {
            let mut docs = self.inner.docs.lock().unwrap();
            let Some(doc) = docs.iter_mut().find(|d| d.id == id) else {
                return Err(BackendError::NotFound);
            };
            if let Some(title) = &patch.title {
                doc.title = Some(title.clone());
            }
            if let Some(completed) = patch.completed {
                doc.completed = Some(completed);
            }
            if let Some(priority) = patch.priority {
                doc.priority = Some(priority.as_str().to_string());
            }
            if let Some(status) = patch.status {
                doc.status = Some(status.as_str().to_string());
            }
            doc.updated_at = Some(Utc::now());
        }
        self.after_write();
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), BackendError> {
        self.record(Recorded::Delete(id.to_string()))?;
        self.inner.docs.lock().unwrap().retain(|d| d.id != id);
        self.after_write();
        Ok(())
    }
}

pub async fn wait_for<F>(store: &TaskStore, condition: F) -> TaskSnapshot
where
    F: Fn(&TaskSnapshot) -> bool,
{
    let mut rx: watch::Receiver<TaskSnapshot> = store.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| condition(s)))
        .await
        .expect("timed out waiting for store state")
        .expect("store state channel closed");
    snapshot.clone()
}

pub fn titles(snapshot: &TaskSnapshot) -> Vec<String> {
    snapshot.tasks.iter().map(|t| t.title.clone()).collect()
}

pub fn doc(id: &str, title: &str, completed: bool, priority: &str) -> RawTaskDocument {
    RawTaskDocument {
        id: id.to_string(),
        title: Some(title.to_string()),
        completed: Some(completed),
        priority: Some(priority.to_string()),
        status: None,
        created_at: Some(Utc::now()),
        updated_at: Some(Utc::now()),
    }
}
