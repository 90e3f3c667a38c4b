use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::auth::repo_types::{AuthProvider, NewUser, Session, User, UserRow};

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> anyhow::Result<Option<User>>;

    /// Oldest account registered under `email`, whatever its provider.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Returns `None` when an account with the same email and provider exists.
    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>>;

    /// Inserts by `(email, provider)` or refreshes `name`/`picture` of the existing row.
    async fn upsert_federated(&self, new: NewUser) -> anyhow::Result<User>;
}

#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn insert(&self, session: &Session) -> anyhow::Result<()>;
    async fn find(&self, token: &str) -> anyhow::Result<Option<Session>>;
    /// Whether a row was removed.
    async fn delete(&self, token: &str) -> anyhow::Result<bool>;
    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
}

const USER_COLUMNS: &str =
    "user_id, email, name, picture, auth_provider, password_hash, created_at";

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_id(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE email = $1
             ORDER BY created_at ASC
             LIMIT 1
            "#
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (user_id, email, name, picture, auth_provider, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email, auth_provider) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.user_id)
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.picture)
        .bind(new.auth_provider.as_str())
        .bind(&new.password_hash)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;
        row.map(User::try_from).transpose()
    }

    async fn upsert_federated(&self, new: NewUser) -> anyhow::Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (user_id, email, name, picture, auth_provider)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email, auth_provider)
            DO UPDATE SET name = EXCLUDED.name, picture = EXCLUDED.picture
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.user_id)
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.picture)
        .bind(AuthProvider::Google.as_str())
        .fetch_one(&self.db)
        .await
        .context("upsert federated user")?;
        User::try_from(row)
    }
}

#[derive(Clone)]
pub struct PgSessionRepo {
    db: PgPool,
}

impl PgSessionRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionRepo for PgSessionRepo {
    async fn insert(&self, session: &Session) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_token, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&session.session_token)
        .bind(&session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.db)
        .await
        .context("insert session")?;
        Ok(())
    }

    async fn find(&self, token: &str) -> anyhow::Result<Option<Session>> {
        sqlx::query_as::<_, Session>(
            r#"
            SELECT session_token, user_id, expires_at, created_at
              FROM sessions
             WHERE session_token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .context("find session")
    }

    async fn delete(&self, token: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM sessions WHERE session_token = $1")
            .bind(token)
            .execute(&self.db)
            .await
            .context("delete session")?;
        Ok(res.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await
            .context("purge expired sessions")?;
        Ok(res.rows_affected())
    }
}
