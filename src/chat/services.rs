use std::fmt::Write as _;

use anyhow::Context;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

use crate::{
    chat::{
        dto::ChatRequest,
        provider::ProviderError,
        repo_types::{ChatMessage, Role},
    },
    error::{AppError, AppResult},
    state::AppState,
    tasks::{
        repo_types::{Priority, TaskDigest},
        services::completion_rate,
    },
};

/// Tasks loaded into the assistant's context.
const DIGEST_LIMIT: i64 = 1000;
/// Messages fetched for context; only the tail is folded into the prompt.
const RECENT_LIMIT: i64 = 10;
const TRANSCRIPT_TURNS: usize = 4;
const TRANSCRIPT_CLIP: usize = 200;
const LISTED_TASKS: usize = 5;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 500;

fn bullet_list(lines: impl Iterator<Item = String>) -> String {
    let lines: Vec<String> = lines.take(LISTED_TASKS).collect();
    if lines.is_empty() {
        return "- None".to_owned();
    }
    lines
        .into_iter()
        .map(|l| format!("- {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fixed assistant instructions with a summary of the owner's tasks on `today`.
pub fn build_system_prompt(today: Date, tasks: &[TaskDigest]) -> String {
    let today_str = today.to_string();
    let todays: Vec<&TaskDigest> = tasks.iter().filter(|t| t.date == today_str).collect();

    let total = tasks.len() as i64;
    let completed = tasks.iter().filter(|t| t.completed).count() as i64;
    let today_total = todays.len();
    let today_completed = todays.iter().filter(|t| t.completed).count();
    let high_pending: Vec<&TaskDigest> = tasks
        .iter()
        .filter(|t| !t.completed && t.priority == Priority::High)
        .collect();

    let due_today = bullet_list(todays.iter().filter(|t| !t.completed).map(|t| {
        match &t.time {
            Some(time) => format!("{} ({}, {time})", t.text, t.priority.as_str()),
            None => format!("{} ({})", t.text, t.priority.as_str()),
        }
    }));
    let urgent = bullet_list(
        high_pending
            .iter()
            .map(|t| format!("{} (due: {})", t.text, t.date)),
    );

    format!(
        "You are the assistant of a personal task planner. You help the user understand \
their productivity, prioritize tasks and plan their work.

Current task data:
- Today's date: {today_str}
- Today's tasks: {today_total} total ({today_completed} completed, {today_pending} pending)
- All tasks: {total} total ({completed} completed, {pending} pending)
- Completion rate: {rate}%
- High priority pending: {high_count}

Today's pending tasks:
{due_today}

High priority pending tasks:
{urgent}

Guidelines:
- Be concise but helpful
- Base insights on the user's actual task data and reference it when asked
- Suggest actionable improvements in a friendly, encouraging tone
- Use clear sections when a reply covers several topics
- Stay under 200 words unless more detail is requested",
        today_pending = today_total - today_completed,
        pending = total - completed,
        rate = completion_rate(completed, total),
        high_count = high_pending.len(),
    )
}

/// Prefixes `message` with a short transcript of the last few turns.
pub fn compose_message(history: &[ChatMessage], message: &str) -> String {
    if history.is_empty() {
        return message.to_owned();
    }
    let mut out = String::from("\n\nRecent conversation:\n");
    let tail = &history[history.len().saturating_sub(TRANSCRIPT_TURNS)..];
    for m in tail {
        let clipped: String = m.content.chars().take(TRANSCRIPT_CLIP).collect();
        let _ = writeln!(out, "{}: {clipped}", m.role.label());
    }
    let _ = write!(out, "\n\nUser's new message: {message}");
    out
}

fn provider_failure(e: ProviderError) -> AppError {
    warn!(error = %e, "chat provider failed");
    match e {
        e @ ProviderError::NotConfigured => AppError::ServiceUnavailable(e.to_string()),
        other => AppError::ServiceUnavailable(format!("AI chat error: {other}")),
    }
}

/// Runs one assistant turn and persists it. Nothing is stored when the provider fails.
pub async fn converse(st: &AppState, owner: &str, req: ChatRequest) -> AppResult<String> {
    // Kept verbatim; history and clear look it up by the raw path segment.
    let session_id = req.session_id;
    if session_id.trim().is_empty() {
        return Err(AppError::BadRequest("session_id is required".into()));
    }
    if req.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message is required".into()));
    }

    let tasks = st.tasks.digest(owner, DIGEST_LIMIT).await?;
    let system_prompt = build_system_prompt(OffsetDateTime::now_utc().date(), &tasks);
    let recent = st
        .chat_messages
        .recent(owner, &session_id, RECENT_LIMIT)
        .await?;
    let composed = compose_message(&recent, &req.message);

    let provider = st.chat_provider.clone();
    let repo = st.chat_messages.clone();
    let owner = owner.to_owned();
    let message = req.message;

    // Detached so a dropped connection cannot stop the turn between the provider call and the write.
    let turn = tokio::spawn(async move {
        let asked = ChatMessage::new(&owner, &session_id, Role::User, message);
        let reply = provider
            .generate_reply(&system_prompt, &composed)
            .await
            .map_err(provider_failure)?;
        let answered = ChatMessage::new(&owner, &session_id, Role::Assistant, reply.clone());
        repo.append_exchange(&asked, &answered).await?;
        info!(session_id = %session_id, "chat turn stored");
        Ok::<_, AppError>(reply)
    });

    turn.await.context("chat turn aborted")?
}

pub async fn chat_history(
    st: &AppState,
    owner: &str,
    session_id: &str,
    limit: Option<i64>,
) -> AppResult<Vec<ChatMessage>> {
    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    Ok(st.chat_messages.history(owner, session_id, limit).await?)
}

pub async fn clear_history(st: &AppState, owner: &str, session_id: &str) -> AppResult<u64> {
    let count = st.chat_messages.clear(owner, session_id).await?;
    info!(session_id, count, "chat history cleared");
    Ok(count)
}
