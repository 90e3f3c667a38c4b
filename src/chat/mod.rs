use crate::{auth::middleware::require_session, state::AppState};
use axum::{middleware::from_fn_with_state, Router};

mod dto;
pub mod handlers;
pub mod provider;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router(state: AppState) -> Router<AppState> {
    handlers::routes().route_layer(from_fn_with_state(state, require_session))
}
