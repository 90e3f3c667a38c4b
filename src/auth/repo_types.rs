use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// How the account authenticates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Email,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Email => "email",
            AuthProvider::Google => "google",
        }
    }
}

impl FromStr for AuthProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(AuthProvider::Email),
            "google" => Ok(AuthProvider::Google),
            other => anyhow::bail!("unknown auth provider {other:?}"),
        }
    }
}

/// User record as seen by the rest of the crate.
/// Not serializable; responses go through `PublicUser`.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub auth_provider: AuthProvider,
    pub password_hash: Option<String>, // present iff auth_provider = email
    pub created_at: OffsetDateTime,
}

/// Raw `users` row.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub auth_provider: String,
    pub password_hash: Option<String>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: r.user_id,
            email: r.email,
            name: r.name,
            picture: r.picture,
            auth_provider: r.auth_provider.parse()?,
            password_hash: r.password_hash,
            created_at: r.created_at,
        })
    }
}

/// Insert payload for a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub auth_provider: AuthProvider,
    pub password_hash: Option<String>,
}

/// Stored session. Never mutated after insert.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_token: String,
    pub user_id: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}
