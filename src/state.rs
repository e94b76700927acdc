use std::sync::Arc;

use crate::store::TaskStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TaskStore>,
}

impl AppState {
    pub fn new(store: TaskStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}
