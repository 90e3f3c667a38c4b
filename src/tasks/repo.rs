use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::tasks::repo_types::{
    DateStats, OrderUpdate, Task, TaskDigest, TaskDigestRow, TaskFilter, TaskPatch, TaskRow,
};

/// Every method is scoped to `owner`; another user's task behaves as absent.
#[async_trait]
pub trait TaskRepo: Send + Sync {
    async fn insert(&self, task: &Task) -> anyhow::Result<()>;

    /// Sorted by date, time (unset first), order, then creation.
    async fn list(&self, owner: &str, filter: &TaskFilter, limit: i64)
        -> anyhow::Result<Vec<Task>>;

    async fn get(&self, owner: &str, id: &str) -> anyhow::Result<Option<Task>>;

    /// Returns the updated task, or `None` when nothing matched.
    async fn update(&self, owner: &str, id: &str, patch: &TaskPatch)
        -> anyhow::Result<Option<Task>>;

    async fn delete(&self, owner: &str, id: &str) -> anyhow::Result<bool>;
    async fn delete_by_date(&self, owner: &str, date: &str) -> anyhow::Result<u64>;

    /// One entry per distinct date, ascending.
    async fn stats_by_date(&self, owner: &str) -> anyhow::Result<Vec<DateStats>>;

    async fn digest(&self, owner: &str, limit: i64) -> anyhow::Result<Vec<TaskDigest>>;

    /// All-or-nothing; returns how many of the owner's tasks were touched.
    async fn reorder(&self, owner: &str, updates: &[OrderUpdate]) -> anyhow::Result<u64>;

    /// Incomplete, timed, reminder set and not yet sent.
    async fn reminder_candidates(&self, owner: &str) -> anyhow::Result<Vec<Task>>;
}

const TASK_COLUMNS: &str = r#"id, user_id, text, completed, priority, date, time, reminder,
    reminder_sent, audio_base64, created_at, "order""#;

const TASK_ORDERING: &str = r#"date ASC, time ASC NULLS FIRST, "order" ASC, created_at ASC"#;

#[derive(Clone)]
pub struct PgTaskRepo {
    db: PgPool,
}

impl PgTaskRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_tasks(rows: Vec<TaskRow>) -> anyhow::Result<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

#[async_trait]
impl TaskRepo for PgTaskRepo {
    async fn insert(&self, task: &Task) -> anyhow::Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO tasks ({TASK_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#
        ))
        .bind(&task.id)
        .bind(&task.user_id)
        .bind(&task.text)
        .bind(task.completed)
        .bind(task.priority.as_str())
        .bind(&task.date)
        .bind(&task.time)
        .bind(task.reminder.map(|r| r.as_str()))
        .bind(task.reminder_sent)
        .bind(&task.audio_base64)
        .bind(task.created_at)
        .bind(task.order)
        .execute(&self.db)
        .await
        .context("insert task")?;
        Ok(())
    }

    async fn list(
        &self,
        owner: &str,
        filter: &TaskFilter,
        limit: i64,
    ) -> anyhow::Result<Vec<Task>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = "
        ));
        qb.push_bind(owner.to_owned());
        if let Some(date) = &filter.date {
            qb.push(" AND date = ").push_bind(date.clone());
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND priority = ").push_bind(priority.as_str());
        }
        qb.push(format!(" ORDER BY {TASK_ORDERING} LIMIT "))
            .push_bind(limit);

        let rows = qb
            .build_query_as::<TaskRow>()
            .fetch_all(&self.db)
            .await
            .context("list tasks")?;
        into_tasks(rows)
    }

    async fn get(&self, owner: &str, id: &str) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await
        .context("get task")?;
        row.map(Task::try_from).transpose()
    }

    async fn update(
        &self,
        owner: &str,
        id: &str,
        patch: &TaskPatch,
    ) -> anyhow::Result<Option<Task>> {
        anyhow::ensure!(!patch.is_empty(), "empty task patch");

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE tasks SET ");
        let mut set = qb.separated(", ");
        if let Some(text) = &patch.text {
            set.push("text = ").push_bind_unseparated(text.clone());
        }
        if let Some(completed) = patch.completed {
            set.push("completed = ").push_bind_unseparated(completed);
        }
        if let Some(priority) = patch.priority {
            set.push("priority = ").push_bind_unseparated(priority.as_str());
        }
        if let Some(date) = &patch.date {
            set.push("date = ").push_bind_unseparated(date.clone());
        }
        if let Some(time) = &patch.time {
            set.push("time = ").push_bind_unseparated(time.clone());
        }
        if let Some(reminder) = patch.reminder {
            set.push("reminder = ")
                .push_bind_unseparated(reminder.map(|r| r.as_str()));
        }
        if let Some(sent) = patch.reminder_sent {
            set.push("reminder_sent = ").push_bind_unseparated(sent);
        }
        if let Some(audio) = &patch.audio_base64 {
            set.push("audio_base64 = ").push_bind_unseparated(audio.clone());
        }
        if let Some(order) = patch.order {
            set.push(r#""order" = "#).push_bind_unseparated(order);
        }
        qb.push(" WHERE id = ")
            .push_bind(id.to_owned())
            .push(" AND user_id = ")
            .push_bind(owner.to_owned())
            .push(format!(" RETURNING {TASK_COLUMNS}"));

        let row = qb
            .build_query_as::<TaskRow>()
            .fetch_optional(&self.db)
            .await
            .context("update task")?;
        row.map(Task::try_from).transpose()
    }

    async fn delete(&self, owner: &str, id: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.db)
            .await
            .context("delete task")?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_by_date(&self, owner: &str, date: &str) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM tasks WHERE user_id = $1 AND date = $2")
            .bind(owner)
            .bind(date)
            .execute(&self.db)
            .await
            .context("delete tasks by date")?;
        Ok(res.rows_affected())
    }

    async fn stats_by_date(&self, owner: &str) -> anyhow::Result<Vec<DateStats>> {
        sqlx::query_as::<_, DateStats>(
            r#"
            SELECT date,
                   COUNT(*)                                     AS total,
                   COUNT(*) FILTER (WHERE completed)            AS completed,
                   COUNT(*) FILTER (WHERE priority = 'high')    AS high_priority
              FROM tasks
             WHERE user_id = $1
             GROUP BY date
             ORDER BY date ASC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.db)
        .await
        .context("task stats by date")
    }

    async fn digest(&self, owner: &str, limit: i64) -> anyhow::Result<Vec<TaskDigest>> {
        let rows = sqlx::query_as::<_, TaskDigestRow>(&format!(
            r#"
            SELECT text, completed, priority, date, time
              FROM tasks
             WHERE user_id = $1
             ORDER BY {TASK_ORDERING}
             LIMIT $2
            "#
        ))
        .bind(owner)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("task digest")?;
        rows.into_iter().map(TaskDigest::try_from).collect()
    }

    async fn reorder(&self, owner: &str, updates: &[OrderUpdate]) -> anyhow::Result<u64> {
        let mut tx = self.db.begin().await.context("begin reorder")?;
        let mut touched = 0;
        for u in updates {
            let res = sqlx::query(r#"UPDATE tasks SET "order" = $1 WHERE id = $2 AND user_id = $3"#)
                .bind(u.order)
                .bind(&u.id)
                .bind(owner)
                .execute(&mut *tx)
                .await
                .context("reorder task")?;
            touched += res.rows_affected();
        }
        tx.commit().await.context("commit reorder")?;
        Ok(touched)
    }

    async fn reminder_candidates(&self, owner: &str) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
              FROM tasks
             WHERE user_id = $1
               AND completed = FALSE
               AND reminder_sent = FALSE
               AND time IS NOT NULL
               AND reminder IS NOT NULL
               AND reminder <> 'none'
             ORDER BY {TASK_ORDERING}
            "#
        ))
        .bind(owner)
        .fetch_all(&self.db)
        .await
        .context("reminder candidates")?;
        into_tasks(rows)
    }
}
