use crate::state::AppState;
use axum::{middleware::from_fn_with_state, Router};

mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod identity;
pub mod middleware;
mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod session;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new().merge(handlers::public_routes()).merge(
        handlers::me_routes().route_layer(from_fn_with_state(state, middleware::require_session)),
    )
}
