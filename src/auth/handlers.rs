use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, FederatedSessionRequest, LoginRequest, PublicUser, RegisterRequest},
        extractors::{CurrentUser, SessionToken},
        repo_types::User,
        services::{self, IssuedSession},
        session::{cleared_session_cookie, session_cookie},
    },
    error::AppResult,
    extract::AppJson,
    state::AppState,
};

/// Routes reachable without a session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/google/session", post(google_session))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

fn signed_in(
    state: &AppState,
    jar: CookieJar,
    user: User,
    session: IssuedSession,
) -> (CookieJar, Json<AuthResponse>) {
    let cookie = session_cookie(
        session.token.clone(),
        state.session_ttl(),
        state.cookie_secure(),
    );
    (
        jar.add(cookie),
        Json(AuthResponse {
            user: PublicUser::from(user),
            session_token: session.token,
        }),
    )
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let (user, session) =
        services::register(&state, &payload.email, &payload.password, &payload.name).await?;
    Ok(signed_in(&state, jar, user, session))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let (user, session) = services::login(&state, &payload.email, &payload.password).await?;
    Ok(signed_in(&state, jar, user, session))
}

#[instrument(skip(state, jar, payload))]
pub async fn google_session(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<FederatedSessionRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let (user, session) = services::exchange_federated_session(&state, &payload.session_id).await?;
    Ok(signed_in(&state, jar, user, session))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    SessionToken(token): SessionToken,
) -> (CookieJar, Json<Value>) {
    services::logout(&state, token.as_deref()).await;
    (
        jar.remove(cleared_session_cookie(state.cookie_secure())),
        Json(json!({ "message": "Logged out successfully" })),
    )
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(user))
}
