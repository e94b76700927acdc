pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod feed;
pub mod firestore;
pub mod models;
pub mod selectors;
pub mod state;
pub mod store;

pub use backend::{BackendError, PersistenceBackend, RemoteBackend};
pub use store::{TaskSnapshot, TaskStore};
