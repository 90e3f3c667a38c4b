use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    routing::{delete, get, put},
    Json, Router,
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    auth::extractors::CurrentUser,
    error::AppResult,
    extract::{AppJson, AppQuery},
    state::AppState,
    tasks::{
        dto::{CreateTaskRequest, ListTasksQuery, PendingRemindersResponse, TaskStatsResponse},
        repo_types::{OrderUpdate, Task, TaskPatch},
        services,
    },
};

pub const RESULT_TRUNCATED: HeaderName = HeaderName::from_static("x-result-truncated");

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/stats/summary", get(task_stats))
        .route("/tasks/reorder", put(reorder_tasks))
        .route("/tasks/reminders/pending", get(pending_reminders))
        .route("/tasks/date/:date", delete(delete_tasks_by_date))
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // voice notes ride along as base64
}

#[instrument(skip(state, user, payload), fields(user_id = %user.user_id))]
pub async fn create_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let task = services::create_task(&state, &user.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppQuery(query): AppQuery<ListTasksQuery>,
) -> AppResult<([(HeaderName, HeaderValue); 1], Json<Vec<Task>>)> {
    let (tasks, truncated) = services::list_tasks(&state, &user.user_id, query).await?;
    let flag = HeaderValue::from_static(if truncated { "true" } else { "false" });
    Ok(([(RESULT_TRUNCATED, flag)], Json(tasks)))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Task>> {
    Ok(Json(services::get_task(&state, &user.user_id, &id).await?))
}

#[instrument(skip(state, user, patch), fields(user_id = %user.user_id))]
pub async fn update_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    AppJson(patch): AppJson<TaskPatch>,
) -> AppResult<Json<Task>> {
    Ok(Json(services::update_task(&state, &user.user_id, &id, patch).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    services::delete_task(&state, &user.user_id, &id).await?;
    Ok(Json(json!({ "message": "Task deleted successfully" })))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn delete_tasks_by_date(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(date): Path<String>,
) -> AppResult<Json<Value>> {
    let count = services::delete_tasks_by_date(&state, &user.user_id, &date).await?;
    Ok(Json(json!({ "message": format!("Deleted {count} tasks"), "count": count })))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn task_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<TaskStatsResponse>> {
    Ok(Json(services::task_stats(&state, &user.user_id).await?))
}

#[instrument(skip(state, user, updates), fields(user_id = %user.user_id))]
pub async fn reorder_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(updates): AppJson<Vec<OrderUpdate>>,
) -> AppResult<Json<Value>> {
    let updated = services::reorder_tasks(&state, &user.user_id, updates).await?;
    Ok(Json(json!({ "message": "Tasks reordered", "updated": updated })))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn pending_reminders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<PendingRemindersResponse>> {
    let reminders =
        services::pending_reminders(&state, &user.user_id, OffsetDateTime::now_utc()).await?;
    Ok(Json(PendingRemindersResponse { reminders }))
}
