use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::chat::repo_types::{ChatMessage, ChatMessageRow};

/// Chat history keyed by `(owner, session_id)`.
#[async_trait]
pub trait ChatRepo: Send + Sync {
    /// The latest `limit` messages, oldest first.
    async fn recent(&self, owner: &str, session_id: &str, limit: i64)
        -> anyhow::Result<Vec<ChatMessage>>;

    /// Stores both sides of a turn or neither.
    async fn append_exchange(&self, user: &ChatMessage, assistant: &ChatMessage)
        -> anyhow::Result<()>;

    /// The first `limit` messages, oldest first.
    async fn history(&self, owner: &str, session_id: &str, limit: i64)
        -> anyhow::Result<Vec<ChatMessage>>;

    async fn clear(&self, owner: &str, session_id: &str) -> anyhow::Result<u64>;
}

const MESSAGE_COLUMNS: &str = r#"id, user_id, session_id, role, content, "timestamp""#;

#[derive(Clone)]
pub struct PgChatRepo {
    db: PgPool,
}

impl PgChatRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_messages(rows: Vec<ChatMessageRow>) -> anyhow::Result<Vec<ChatMessage>> {
    rows.into_iter().map(ChatMessage::try_from).collect()
}

#[async_trait]
impl ChatRepo for PgChatRepo {
    async fn recent(
        &self,
        owner: &str,
        session_id: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, ChatMessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
              FROM chat_messages
             WHERE user_id = $1 AND session_id = $2
             ORDER BY "timestamp" DESC, seq DESC
             LIMIT $3
            "#
        ))
        .bind(owner)
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("recent chat messages")?;
        let mut messages = into_messages(rows)?;
        messages.reverse();
        Ok(messages)
    }

    async fn append_exchange(
        &self,
        user: &ChatMessage,
        assistant: &ChatMessage,
    ) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await.context("begin chat exchange")?;
        for m in [user, assistant] {
            sqlx::query(&format!(
                "INSERT INTO chat_messages ({MESSAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
            ))
            .bind(&m.id)
            .bind(&m.user_id)
            .bind(&m.session_id)
            .bind(m.role.as_str())
            .bind(&m.content)
            .bind(m.timestamp)
            .execute(&mut *tx)
            .await
            .context("insert chat message")?;
        }
        tx.commit().await.context("commit chat exchange")?;
        Ok(())
    }

    async fn history(
        &self,
        owner: &str,
        session_id: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, ChatMessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
              FROM chat_messages
             WHERE user_id = $1 AND session_id = $2
             ORDER BY "timestamp" ASC, seq ASC
             LIMIT $3
            "#
        ))
        .bind(owner)
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("chat history")?;
        into_messages(rows)
    }

    async fn clear(&self, owner: &str, session_id: &str) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM chat_messages WHERE user_id = $1 AND session_id = $2")
            .bind(owner)
            .bind(session_id)
            .execute(&self.db)
            .await
            .context("clear chat history")?;
        Ok(res.rows_affected())
    }
}
