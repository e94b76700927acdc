use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::feed::ChangeFeed;
use crate::models::{Priority, TaskPatch, TaskStatus};

#[derive(Debug, Error)]
pub enum BackendError {
    /// The document does not exist (a benign race with a delete).
    #[error("document not found")]
    NotFound,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend responded {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("no async runtime available to run backend requests")]
    NoRuntime,
}

/// Full document written when a task is created. Timestamps are left to
/// the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskDocument {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub priority: Priority,
    pub status: TaskStatus,
}

impl NewTaskDocument {
    pub fn new(id: String, title: String, priority: Priority) -> Self {
        Self {
            id,
            title,
            completed: false,
            priority,
            status: TaskStatus::Todo,
        }
    }
}

/// A remote document store holding one document per task.
///
/// Writes never touch the caller's view of the list; the feed returned by
/// `subscribe` is the only source of observable state.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Opens a live feed of full snapshots ordered by `createdAt` descending.
    fn subscribe(&self) -> ChangeFeed;

    async fn create_task(&self, doc: &NewTaskDocument) -> Result<(), BackendError>;

    /// Sends only the fields present in `patch`; `updatedAt` is refreshed by
    /// the backend. Returns `NotFound` for a missing document.
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<(), BackendError>;

    async fn delete_task(&self, id: &str) -> Result<(), BackendError>;
}

/// Where the task store persists to, injected at construction.
#[derive(Clone, Default)]
pub enum PersistenceBackend {
    /// Memory only; state is lost on restart.
    #[default]
    None,
    Remote(Arc<dyn RemoteBackend>),
}

impl PersistenceBackend {
    pub fn remote<B>(backend: B) -> Self
    where
        B: RemoteBackend + 'static,
    {
        PersistenceBackend::Remote(Arc::new(backend))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, PersistenceBackend::Remote(_))
    }
}

impl fmt::Debug for PersistenceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceBackend::None => f.write_str("PersistenceBackend::None"),
            PersistenceBackend::Remote(_) => f.write_str("PersistenceBackend::Remote"),
        }
    }
}
