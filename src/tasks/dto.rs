use serde::{Deserialize, Serialize};

use super::repo_types::{DateStats, Priority, Reminder, Task};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub text: String,
    #[serde(default)]
    pub priority: Priority,
    pub date: String,
    pub time: Option<String>,
    pub reminder: Option<Reminder>,
    pub audio_base64: Option<String>,
    pub order: Option<i32>,
}

/// Query string of `GET /tasks`. Empty values count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub date: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskStatsResponse {
    pub by_date: Vec<DateStats>,
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
    pub completion_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct PendingRemindersResponse {
    pub reminders: Vec<Task>,
}
