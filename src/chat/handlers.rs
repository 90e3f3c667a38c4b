use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    auth::extractors::CurrentUser,
    chat::{
        dto::{ChatRequest, ChatResponse, HistoryQuery},
        repo_types::ChatMessage,
        services,
    },
    error::AppResult,
    extract::{AppJson, AppQuery},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/chat", post(chat)).route(
        "/chat/history/:session_id",
        get(get_history).delete(clear_history),
    )
}

#[instrument(skip(state, user, payload), fields(user_id = %user.user_id))]
pub async fn chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    let response = services::converse(&state, &user.user_id, payload).await?;
    Ok(Json(ChatResponse { response }))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(session_id): Path<String>,
    AppQuery(q): AppQuery<HistoryQuery>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    let messages = services::chat_history(&state, &user.user_id, &session_id, q.limit).await?;
    Ok(Json(messages))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn clear_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(session_id): Path<String>,
) -> AppResult<Json<Value>> {
    let count = services::clear_history(&state, &user.user_id, &session_id).await?;
    Ok(Json(json!({ "message": format!("Cleared {count} messages"), "count": count })))
}
