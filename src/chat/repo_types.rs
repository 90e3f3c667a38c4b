use std::str::FromStr;

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Speaker label used in transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => anyhow::bail!("unknown chat role {other:?}"),
        }
    }
}

/// One side of an exchange. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ChatMessage {
    pub fn new(user_id: &str, session_id: &str, role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            session_id: session_id.to_owned(),
            role,
            content,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ChatMessageRow {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub timestamp: OffsetDateTime,
}

impl TryFrom<ChatMessageRow> for ChatMessage {
    type Error = anyhow::Error;

    fn try_from(r: ChatMessageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            session_id: r.session_id,
            role: r.role.parse()?,
            content: r.content,
            timestamp: r.timestamp,
        })
    }
}
