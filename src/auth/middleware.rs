//! Session gate for every task, stats and chat route.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::{
    extractors::{CurrentUser, SessionToken},
    services::resolve_session,
};
use crate::{error::AppError, state::AppState};

/// Resolves the session before the handler runs and attaches [`CurrentUser`].
pub async fn require_session(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = resolve_session(&state, token.as_deref()).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
