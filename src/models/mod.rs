pub mod task;

pub use task::{
    NewTask, Priority, Task, TaskPatch, TaskStatus, TitleError, TITLE_MAX_LENGTH, normalize_title,
};
