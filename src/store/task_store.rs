use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, NewTaskDocument, PersistenceBackend};
use crate::feed::{ChangeFeed, FeedEvent};
use crate::models::{Priority, Task, TaskPatch, TaskStatus, normalize_title};
use crate::store::ordering::sort_tasks;

const FEED_ENDED: &str = "task feed ended unexpectedly";
const NO_RUNTIME: &str = "no async runtime available to run the task feed";

/// Which failure the current `error` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The change feed failed. Blocking: the list cannot be trusted.
    Subscription,
    /// A single create/update/delete failed. The list stays usable.
    Command,
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub tasks: Vec<Task>,
    pub loading: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub is_remote_backed: bool,
}

/// Owns the task list for a session.
///
/// In local mode commands mutate the list directly, in command order. In
/// remote mode commands only issue backend writes and the change feed is the
/// single writer of the list; write failures land in `error`.
pub struct TaskStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    backend: PersistenceBackend,
    runtime: Option<Handle>,
    state: watch::Sender<TaskSnapshot>,
    live: watch::Sender<bool>,
    in_flight: watch::Sender<usize>,
}

impl TaskStore {
    /// Builds the store and, for a remote backend, subscribes to its feed.
    ///
    /// A remote backend needs a Tokio runtime. Built outside one, the store
    /// starts in the subscription error state and remote commands fail.
    pub fn new(backend: PersistenceBackend) -> Self {
        let remote = backend.is_remote();
        let (state, _) = watch::channel(TaskSnapshot {
            tasks: Vec::new(),
            loading: remote,
            error: None,
            error_kind: None,
            is_remote_backed: remote,
        });
        let (live, _) = watch::channel(true);
        let (in_flight, _) = watch::channel(0usize);

        let inner = Arc::new(StoreInner {
            backend,
            runtime: Handle::try_current().ok(),
            state,
            live,
            in_flight,
        });

        match &inner.backend {
            PersistenceBackend::None => {
                info!("No remote backend configured, running in local mode (tasks are kept in memory only)");
            }
            PersistenceBackend::Remote(remote) => match &inner.runtime {
                Some(runtime) => {
                    info!("Subscribing to remote task feed");
                    let feed = remote.subscribe();
                    runtime.spawn(run_feed(inner.clone(), feed));
                }
                None => {
                    error!("Cannot subscribe to remote task feed: {}", NO_RUNTIME);
                    inner.apply_feed_event(FeedEvent::Error(NO_RUNTIME.to_string()));
                }
            },
        }

        Self { inner }
    }

    pub fn is_remote_backed(&self) -> bool {
        self.inner.backend.is_remote()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn add(&self, title: &str, priority: Priority) {
        let title = match normalize_title(title) {
            Ok(title) => title,
            Err(e) => {
                debug!("Rejected new task: {}", e);
                return;
            }
        };
        let id = Uuid::new_v4().to_string();

        match &self.inner.backend {
            PersistenceBackend::None => {
                let now = Utc::now();
                let task = Task {
                    id,
                    title,
                    completed: false,
                    status: TaskStatus::Todo,
                    priority,
                    created_at: now,
                    updated_at: now,
                };
                self.inner.state.send_modify(|s| {
                    s.tasks.push(task);
                    sort_tasks(&mut s.tasks);
                });
            }
            PersistenceBackend::Remote(remote) => {
                let remote = remote.clone();
                let doc = NewTaskDocument::new(id, title, priority);
                self.spawn_write("add", async move { remote.create_task(&doc).await });
            }
        }
    }

    /// Unknown ids are ignored in both modes.
    pub fn update(&self, id: &str, patch: TaskPatch) {
        let Some(patch) = validate_patch(id, patch) else {
            return;
        };

        match &self.inner.backend {
            PersistenceBackend::None => {
                let applied = self.inner.state.send_if_modified(|s| {
                    let Some(task) = s.tasks.iter_mut().find(|t| t.id == id) else {
                        return false;
                    };
                    let patch = patch.reconcile(Some(&*task));
                    patch.apply_to(task, Utc::now());
                    sort_tasks(&mut s.tasks);
                    true
                });
                if !applied {
                    debug!("Ignoring update for unknown task {}", id);
                }
            }
            PersistenceBackend::Remote(remote) => {
                let patch = {
                    let state = self.inner.state.borrow();
                    patch.reconcile(state.tasks.iter().find(|t| t.id == id))
                };
                let remote = remote.clone();
                let id = id.to_string();
                self.spawn_write("update", async move { remote.update_task(&id, &patch).await });
            }
        }
    }

    pub fn delete(&self, id: &str) {
        match &self.inner.backend {
            PersistenceBackend::None => {
                let removed = self.inner.state.send_if_modified(|s| {
                    let before = s.tasks.len();
                    s.tasks.retain(|t| t.id != id);
                    s.tasks.len() != before
                });
                if !removed {
                    debug!("Ignoring delete for unknown task {}", id);
                }
            }
            PersistenceBackend::Remote(remote) => {
                let remote = remote.clone();
                let id = id.to_string();
                self.spawn_write("delete", async move { remote.delete_task(&id).await });
            }
        }
    }

    pub fn toggle_complete(&self, id: &str, completed: bool) {
        self.update(id, TaskPatch::completed(completed));
    }

    /// Moves a task to another board column.
    pub fn reorder_by_status(&self, id: &str, status: TaskStatus) {
        self.update(id, TaskPatch::status(status));
    }

    /// Waits until every remote write issued so far has been answered.
    pub async fn flush(&self) {
        let mut in_flight = self.inner.in_flight.subscribe();
        let _ = in_flight.wait_for(|n| *n == 0).await;
    }

    /// Ends the session. Feed events and write results that arrive after
    /// this returns are dropped.
    pub fn close(&self) {
        let inner = &self.inner;
        let mut was_live = false;
        // Flip under the state lock so no late event can slip in between.
        inner.state.send_if_modified(|_| {
            was_live = inner.live.send_replace(false);
            false
        });
        if was_live {
            info!("Task store closed");
        }
    }

    fn spawn_write<F>(&self, op: &'static str, write: F)
    where
        F: Future<Output = Result<(), BackendError>> + Send + 'static,
    {
        let inner = self.inner.clone();
        let Some(runtime) = inner.runtime.clone() else {
            inner.finish_write(op, Err(BackendError::NoRuntime));
            return;
        };
        inner.in_flight.send_modify(|n| *n += 1);
        runtime.spawn(async move {
            let result = write.await;
            inner.finish_write(op, result);
            inner.in_flight.send_modify(|n| *n = n.saturating_sub(1));
        });
    }
}

impl Drop for TaskStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl StoreInner {
    fn is_live(&self) -> bool {
        *self.live.borrow()
    }

    fn apply_feed_event(&self, event: FeedEvent) {
        self.state.send_if_modified(|s| {
            if !self.is_live() {
                debug!("Dropping feed event received after close");
                return false;
            }
            match event {
                FeedEvent::Snapshot(mut tasks) => {
                    debug!("Feed snapshot with {} tasks", tasks.len());
                    sort_tasks(&mut tasks);
                    s.tasks = tasks;
                    s.error = None;
                    s.error_kind = None;
                }
                FeedEvent::Error(message) => {
                    warn!("Task feed failed: {}", message);
                    s.error = Some(message);
                    s.error_kind = Some(ErrorKind::Subscription);
                }
            }
            s.loading = false;
            true
        });
    }

    fn finish_write(&self, op: &str, result: Result<(), BackendError>) {
        self.state.send_if_modified(|s| {
            if !self.is_live() {
                debug!("Dropping {} result received after close", op);
                return false;
            }
            match result {
                Ok(()) => {
                    if s.error_kind != Some(ErrorKind::Command) {
                        return false;
                    }
                    s.error = None;
                    s.error_kind = None;
                    true
                }
                Err(BackendError::NotFound) => {
                    debug!("{} skipped: task no longer exists", op);
                    false
                }
                Err(e) => {
                    warn!("{} failed: {}", op, e);
                    s.error = Some(e.to_string());
                    s.error_kind = Some(ErrorKind::Command);
                    true
                }
            }
        });
    }
}

fn validate_patch(id: &str, mut patch: TaskPatch) -> Option<TaskPatch> {
    if let Some(raw) = patch.title.take() {
        match normalize_title(&raw) {
            Ok(title) => patch.title = Some(title),
            Err(e) => {
                debug!("Rejected edit of task {}: {}", id, e);
                return None;
            }
        }
    }
    if patch.is_empty() {
        return None;
    }
    Some(patch)
}

async fn run_feed(inner: Arc<StoreInner>, mut feed: ChangeFeed) {
    let mut live = inner.live.subscribe();
    loop {
        let event = tokio::select! {
            biased;
            _ = live.wait_for(|live| !*live) => break,
            event = feed.next() => event,
        };
        let Some(event) = event else {
            // The producer went away while the store is still live.
            inner.apply_feed_event(FeedEvent::Error(FEED_ENDED.to_string()));
            break;
        };
        inner.apply_feed_event(event);
    }
    feed.close();
    info!("Unsubscribed from remote task feed");
}
