use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    All,
    Active,
    Completed,
}

#[derive(Debug, Error)]
#[error("unknown filter: {0}")]
pub struct UnknownFilter(pub String);

impl FromStr for FilterType {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(FilterType::All),
            "active" => Ok(FilterType::Active),
            "completed" => Ok(FilterType::Completed),
            other => Err(UnknownFilter(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TaskCounts {
    pub all: usize,
    pub active: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusColumns {
    pub todo: Vec<Task>,
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
}

pub fn filter_by(list: &[Task], filter: FilterType) -> Vec<Task> {
    list.iter()
        .filter(|t| match filter {
            FilterType::All => true,
            FilterType::Active => !t.completed,
            FilterType::Completed => t.completed,
        })
        .cloned()
        .collect()
}

pub fn counts(list: &[Task]) -> TaskCounts {
    let completed = list.iter().filter(|t| t.completed).count();
    TaskCounts {
        all: list.len(),
        active: list.len() - completed,
        completed,
    }
}

/// Splits the list into board columns, keeping each column in list order.
pub fn group_by_status(list: &[Task]) -> StatusColumns {
    let mut columns = StatusColumns::default();
    for task in list {
        let column = match task.status {
            TaskStatus::Todo => &mut columns.todo,
            TaskStatus::InProgress => &mut columns.in_progress,
            TaskStatus::Done => &mut columns.done,
        };
        column.push(task.clone());
    }
    columns
}
