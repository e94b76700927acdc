use crate::models::Task;

/// Incomplete before complete, then high < medium < low.
///
/// `sort_by_key` is stable, so tasks with the same completion and priority
/// keep their relative order.
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by_key(|t| (t.completed, t.priority.rank()));
}
