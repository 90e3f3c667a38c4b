//! In-memory collaborators behind `AppState::fake()`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

use crate::{
    auth::{
        identity::{ExternalIdentity, IdentityResolver},
        repo::{SessionRepo, UserRepo},
        repo_types::{AuthProvider, NewUser, Session, User},
    },
    chat::{
        provider::{ChatProvider, ProviderError},
        repo::ChatRepo,
        repo_types::ChatMessage,
    },
    tasks::{
        repo::TaskRepo,
        repo_types::{DateStats, OrderUpdate, Priority, Task, TaskDigest, TaskFilter, TaskPatch},
        services::listing_order,
    },
};

/// Mirrors the SQL repositories, including owner scoping and ordering.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<Vec<User>>,
    sessions: RwLock<HashMap<String, Session>>,
    tasks: RwLock<Vec<Task>>,
    messages: RwLock<Vec<ChatMessage>>,
}

fn user_from(new: NewUser) -> User {
    User {
        user_id: new.user_id,
        email: new.email,
        name: new.name,
        picture: new.picture,
        auth_provider: new.auth_provider,
        password_hash: new.password_hash,
        created_at: OffsetDateTime::now_utc(),
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_id(&self, user_id: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        // insertion order is creation order
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let mut users = self.users.write().await;
        if users
            .iter()
            .any(|u| u.email == new.email && u.auth_provider == new.auth_provider)
        {
            return Ok(None);
        }
        let user = user_from(new);
        users.push(user.clone());
        Ok(Some(user))
    }

    async fn upsert_federated(&self, new: NewUser) -> anyhow::Result<User> {
        let mut users = self.users.write().await;
        if let Some(existing) = users
            .iter_mut()
            .find(|u| u.email == new.email && u.auth_provider == AuthProvider::Google)
        {
            existing.name = new.name;
            existing.picture = new.picture;
            return Ok(existing.clone());
        }
        let user = user_from(NewUser {
            auth_provider: AuthProvider::Google,
            password_hash: None,
            ..new
        });
        users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn insert(&self, session: &Session) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        anyhow::ensure!(
            !sessions.contains_key(&session.session_token),
            "duplicate session token"
        );
        sessions.insert(session.session_token.clone(), session.clone());
        Ok(())
    }

    async fn find(&self, token: &str) -> anyhow::Result<Option<Session>> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn delete(&self, token: &str) -> anyhow::Result<bool> {
        Ok(self.sessions.write().await.remove(token).is_some())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait]
impl TaskRepo for MemoryStore {
    async fn insert(&self, task: &Task) -> anyhow::Result<()> {
        self.tasks.write().await.push(task.clone());
        Ok(())
    }

    async fn list(
        &self,
        owner: &str,
        filter: &TaskFilter,
        limit: i64,
    ) -> anyhow::Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<Task> = tasks
            .iter()
            .filter(|t| t.user_id == owner && filter.matches(t))
            .cloned()
            .collect();
        found.sort_by(listing_order);
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn get(&self, owner: &str, id: &str) -> anyhow::Result<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .iter()
            .find(|t| t.id == id && t.user_id == owner)
            .cloned())
    }

    async fn update(
        &self,
        owner: &str,
        id: &str,
        patch: &TaskPatch,
    ) -> anyhow::Result<Option<Task>> {
        anyhow::ensure!(!patch.is_empty(), "empty task patch");
        let mut tasks = self.tasks.write().await;
        Ok(tasks
            .iter_mut()
            .find(|t| t.id == id && t.user_id == owner)
            .map(|t| {
                patch.apply(t);
                t.clone()
            }))
    }

    async fn delete(&self, owner: &str, id: &str) -> anyhow::Result<bool> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|t| !(t.id == id && t.user_id == owner));
        Ok(tasks.len() < before)
    }

    async fn delete_by_date(&self, owner: &str, date: &str) -> anyhow::Result<u64> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|t| !(t.user_id == owner && t.date == date));
        Ok((before - tasks.len()) as u64)
    }

    async fn stats_by_date(&self, owner: &str) -> anyhow::Result<Vec<DateStats>> {
        let tasks = self.tasks.read().await;
        let mut by_date: BTreeMap<&str, DateStats> = BTreeMap::new();
        for t in tasks.iter().filter(|t| t.user_id == owner) {
            let entry = by_date.entry(t.date.as_str()).or_insert_with(|| DateStats {
                date: t.date.clone(),
                total: 0,
                completed: 0,
                high_priority: 0,
            });
            entry.total += 1;
            entry.completed += i64::from(t.completed);
            entry.high_priority += i64::from(t.priority == Priority::High);
        }
        Ok(by_date.into_values().collect())
    }

    async fn digest(&self, owner: &str, limit: i64) -> anyhow::Result<Vec<TaskDigest>> {
        let listed = self.list(owner, &TaskFilter::default(), limit).await?;
        Ok(listed.iter().map(TaskDigest::from).collect())
    }

    async fn reorder(&self, owner: &str, updates: &[OrderUpdate]) -> anyhow::Result<u64> {
        let mut tasks = self.tasks.write().await;
        let mut touched = 0;
        for u in updates {
            if let Some(t) = tasks.iter_mut().find(|t| t.id == u.id && t.user_id == owner) {
                t.order = u.order;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn reminder_candidates(&self, owner: &str) -> anyhow::Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<Task> = tasks
            .iter()
            .filter(|t| {
                t.user_id == owner
                    && !t.completed
                    && !t.reminder_sent
                    && t.time.is_some()
                    && t.reminder.is_some_and(|r| r.lead().is_some())
            })
            .cloned()
            .collect();
        found.sort_by(listing_order);
        Ok(found)
    }
}

#[async_trait]
impl ChatRepo for MemoryStore {
    async fn recent(
        &self,
        owner: &str,
        session_id: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let messages = self.messages.read().await;
        let thread: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.user_id == owner && m.session_id == session_id)
            .cloned()
            .collect();
        let skip = thread.len().saturating_sub(limit.max(0) as usize);
        Ok(thread.into_iter().skip(skip).collect())
    }

    async fn append_exchange(
        &self,
        user: &ChatMessage,
        assistant: &ChatMessage,
    ) -> anyhow::Result<()> {
        let mut messages = self.messages.write().await;
        messages.push(user.clone());
        messages.push(assistant.clone());
        Ok(())
    }

    async fn history(
        &self,
        owner: &str,
        session_id: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.user_id == owner && m.session_id == session_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn clear(&self, owner: &str, session_id: &str) -> anyhow::Result<u64> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|m| !(m.user_id == owner && m.session_id == session_id));
        Ok((before - messages.len()) as u64)
    }
}

/// Accepts ids shaped `valid-<local>` or `valid-<local>?name=<name>` and
/// answers with `<local>@gmail.test`; everything else is rejected.
#[derive(Default)]
pub struct FakeIdentity;

#[async_trait]
impl IdentityResolver for FakeIdentity {
    async fn resolve(&self, external_session_id: &str) -> anyhow::Result<ExternalIdentity> {
        let Some(rest) = external_session_id.strip_prefix("valid-") else {
            anyhow::bail!("identity provider returned 401 Unauthorized");
        };
        let (local, name) = match rest.split_once("?name=") {
            Some((local, name)) => (local, name.to_owned()),
            None => (rest, String::new()),
        };
        Ok(ExternalIdentity {
            email: format!("{local}@gmail.test"),
            name,
            picture: Some(format!("https://pictures.test/{local}.png")),
        })
    }
}

enum Script {
    Reply(String),
    Fail,
    Unconfigured,
}

/// Scripted provider that records every `(system_prompt, message)` it receives.
pub struct FakeChatProvider {
    script: Script,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeChatProvider {
    fn with(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::with(Script::Reply(text.to_owned()))
    }

    pub fn failing() -> Self {
        Self::with(Script::Fail)
    }

    pub fn unconfigured() -> Self {
        Self::with(Script::Unconfigured)
    }

    pub async fn last_call(&self) -> Option<(String, String)> {
        self.calls.lock().await.last().cloned()
    }
}

#[async_trait]
impl ChatProvider for FakeChatProvider {
    async fn generate_reply(
        &self,
        system_prompt: &str,
        message: &str,
    ) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .await
            .push((system_prompt.to_owned(), message.to_owned()));
        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Fail => Err(ProviderError::Status {
                status: 503,
                body: "upstream unavailable".into(),
            }),
            Script::Unconfigured => Err(ProviderError::NotConfigured),
        }
    }
}
