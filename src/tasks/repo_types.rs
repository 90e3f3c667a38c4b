use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => anyhow::bail!("unknown priority {other:?}"),
        }
    }
}

/// How long before the task's time the reminder fires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Reminder {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "attime")]
    AtTime,
}

impl Reminder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reminder::None => "none",
            Reminder::FifteenMinutes => "15min",
            Reminder::ThirtyMinutes => "30min",
            Reminder::OneHour => "1hour",
            Reminder::AtTime => "attime",
        }
    }

    /// `None` when the reminder is switched off.
    pub fn lead(&self) -> Option<Duration> {
        match self {
            Reminder::None => None,
            Reminder::FifteenMinutes => Some(Duration::minutes(15)),
            Reminder::ThirtyMinutes => Some(Duration::minutes(30)),
            Reminder::OneHour => Some(Duration::hours(1)),
            Reminder::AtTime => Some(Duration::ZERO),
        }
    }
}

impl FromStr for Reminder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Reminder::None),
            "15min" => Ok(Reminder::FifteenMinutes),
            "30min" => Ok(Reminder::ThirtyMinutes),
            "1hour" => Ok(Reminder::OneHour),
            "attime" => Ok(Reminder::AtTime),
            other => anyhow::bail!("unknown reminder {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub completed: bool,
    pub priority: Priority,
    pub date: String,         // YYYY-MM-DD, no timezone
    pub time: Option<String>, // HH:MM
    pub reminder: Option<Reminder>,
    pub reminder_sent: bool,
    pub audio_base64: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub order: i32,
}

/// Raw `tasks` row.
#[derive(Debug, FromRow)]
pub struct TaskRow {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub completed: bool,
    pub priority: String,
    pub date: String,
    pub time: Option<String>,
    pub reminder: Option<String>,
    pub reminder_sent: bool,
    pub audio_base64: Option<String>,
    pub created_at: OffsetDateTime,
    pub order: i32,
}

impl TryFrom<TaskRow> for Task {
    type Error = anyhow::Error;

    fn try_from(r: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            text: r.text,
            completed: r.completed,
            priority: r.priority.parse()?,
            date: r.date,
            time: r.time,
            reminder: r.reminder.as_deref().map(str::parse).transpose()?,
            reminder_sent: r.reminder_sent,
            audio_base64: r.audio_base64,
            created_at: r.created_at,
            order: r.order,
        })
    }
}

/// Fields a client may change. `None` means "leave as is"; the nested option on
/// nullable fields distinguishes an explicit `null` (clear) from omission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub date: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub time: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub reminder: Option<Option<Reminder>>,
    pub reminder_sent: Option<bool>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub audio_base64: Option<Option<String>>,
    pub order: Option<i32>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.completed.is_none()
            && self.priority.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.reminder.is_none()
            && self.reminder_sent.is_none()
            && self.audio_base64.is_none()
            && self.order.is_none()
    }

    /// Applies the present fields onto `task`.
    pub fn apply(&self, task: &mut Task) {
        if let Some(text) = &self.text {
            task.text = text.clone();
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(date) = &self.date {
            task.date = date.clone();
        }
        if let Some(time) = &self.time {
            task.time = time.clone();
        }
        if let Some(reminder) = self.reminder {
            task.reminder = reminder;
        }
        if let Some(sent) = self.reminder_sent {
            task.reminder_sent = sent;
        }
        if let Some(audio) = &self.audio_base64 {
            task.audio_base64 = audio.clone();
        }
        if let Some(order) = self.order {
            task.order = order;
        }
    }
}

// Present-but-null becomes Some(None); absence is handled by `default`.
fn explicit_null<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Optional list filters; both are exact matches.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub date: Option<String>,
    pub priority: Option<Priority>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.date.as_deref().map_or(true, |d| task.date == d)
            && self.priority.map_or(true, |p| task.priority == p)
    }
}

/// Per-date aggregate for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct DateStats {
    pub date: String,
    pub total: i64,
    pub completed: i64,
    pub high_priority: i64,
}

/// Projection the chat assistant reads.
#[derive(Debug, Clone)]
pub struct TaskDigest {
    pub text: String,
    pub completed: bool,
    pub priority: Priority,
    pub date: String,
    pub time: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct TaskDigestRow {
    pub text: String,
    pub completed: bool,
    pub priority: String,
    pub date: String,
    pub time: Option<String>,
}

impl TryFrom<TaskDigestRow> for TaskDigest {
    type Error = anyhow::Error;

    fn try_from(r: TaskDigestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            text: r.text,
            completed: r.completed,
            priority: r.priority.parse()?,
            date: r.date,
            time: r.time,
        })
    }
}

impl From<&Task> for TaskDigest {
    fn from(t: &Task) -> Self {
        Self {
            text: t.text.clone(),
            completed: t.completed,
            priority: t.priority,
            date: t.date.clone(),
            time: t.time.clone(),
        }
    }
}

/// One entry of a reorder request.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderUpdate {
    pub id: String,
    pub order: i32,
}
