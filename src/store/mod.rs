pub mod ordering;
pub mod task_store;

pub use ordering::sort_tasks;
pub use task_store::{ErrorKind, TaskSnapshot, TaskStore};
