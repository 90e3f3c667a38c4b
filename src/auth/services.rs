use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        password::{hash_password_blocking, verify_password_blocking},
        repo_types::{AuthProvider, NewUser, Session, User},
        session::{generate_token, is_live},
    },
    error::{AppError, AppResult},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

/// Freshly created session, returned once to the client.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn new_user_id() -> String {
    format!("user_{}", Uuid::new_v4().simple())
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid email or password".into())
}

pub async fn register(
    st: &AppState,
    email: &str,
    password: &str,
    name: &str,
) -> AppResult<(User, IssuedSession)> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email".into()));
    }

    // Checked before any password rule so a taken email always yields the same error.
    if st.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest("Password too short".into()));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }

    let hash = hash_password_blocking(password.to_owned()).await?;
    let user = st
        .users
        .create(NewUser {
            user_id: new_user_id(),
            email: email.clone(),
            name: name.to_owned(),
            picture: None,
            auth_provider: AuthProvider::Email,
            password_hash: Some(hash),
        })
        .await?
        .ok_or_else(|| AppError::Conflict("Email already registered".into()))?;

    let session = issue_session(st, &user.user_id).await?;
    info!(user_id = %user.user_id, "user registered");
    Ok((user, session))
}

pub async fn login(st: &AppState, email: &str, password: &str) -> AppResult<(User, IssuedSession)> {
    let email = normalize_email(email);

    let Some(user) = st.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(invalid_credentials());
    };

    if user.auth_provider != AuthProvider::Email {
        warn!(user_id = %user.user_id, provider = user.auth_provider.as_str(), "password login on federated account");
        return Err(AppError::Unauthorized(
            "This account uses Google sign-in".into(),
        ));
    }

    let Some(hash) = user.password_hash.clone() else {
        warn!(user_id = %user.user_id, "email account without password hash");
        return Err(invalid_credentials());
    };

    if !verify_password_blocking(password.to_owned(), hash).await? {
        warn!(user_id = %user.user_id, "login invalid password");
        return Err(invalid_credentials());
    }

    let session = issue_session(st, &user.user_id).await?;
    info!(user_id = %user.user_id, "user logged in");
    Ok((user, session))
}

pub async fn exchange_federated_session(
    st: &AppState,
    external_session_id: &str,
) -> AppResult<(User, IssuedSession)> {
    if external_session_id.trim().is_empty() {
        return Err(AppError::BadRequest("session_id is required".into()));
    }

    let identity = st
        .identity
        .resolve(external_session_id)
        .await
        .map_err(|e| {
            warn!(error = %e, "federated session exchange failed");
            AppError::Unauthorized("Invalid federated session".into())
        })?;

    let email = normalize_email(&identity.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "identity provider returned an unusable email");
        return Err(AppError::Unauthorized("Invalid federated session".into()));
    }
    let name = match identity.name.trim() {
        "" => email.split('@').next().unwrap_or_default().to_owned(),
        n => n.to_owned(),
    };

    let user = st
        .users
        .upsert_federated(NewUser {
            user_id: new_user_id(),
            email,
            name,
            picture: identity.picture,
            auth_provider: AuthProvider::Google,
            password_hash: None,
        })
        .await?;

    let session = issue_session(st, &user.user_id).await?;
    info!(user_id = %user.user_id, "federated sign-in");
    Ok((user, session))
}

pub async fn resolve_session(st: &AppState, token: Option<&str>) -> AppResult<User> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(AppError::unauthorized)?;

    let session = st
        .sessions
        .find(token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid session".into()))?;

    if !is_live(session.expires_at, OffsetDateTime::now_utc()) {
        debug!(user_id = %session.user_id, "session expired");
        return Err(AppError::Unauthorized("Session expired".into()));
    }

    st.users
        .find_by_id(&session.user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %session.user_id, "session references a missing user");
            AppError::Unauthorized("Invalid session".into())
        })
}

/// Idempotent; an unknown or absent token is not an error.
pub async fn logout(st: &AppState, token: Option<&str>) {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return;
    };
    match st.sessions.delete(token).await {
        Ok(true) => info!("session revoked"),
        Ok(false) => debug!("logout with unknown session"),
        Err(e) => warn!(error = %e, "session delete failed during logout"),
    }
}

pub(crate) async fn issue_session(st: &AppState, user_id: &str) -> AppResult<IssuedSession> {
    let now = OffsetDateTime::now_utc();
    let session = Session {
        session_token: generate_token(),
        user_id: user_id.to_owned(),
        expires_at: now + st.session_ttl(),
        created_at: now,
    };
    st.sessions.insert(&session).await?;
    Ok(IssuedSession {
        token: session.session_token,
        expires_at: session.expires_at,
    })
}

/// Deletes expired sessions every `interval_secs`; runs until the runtime stops.
pub async fn run_session_cleanup(st: AppState, interval_secs: u64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match st.sessions.purge_expired(OffsetDateTime::now_utc()).await {
            Ok(0) => debug!("no expired sessions"),
            Ok(n) => info!(purged = n, "expired sessions removed"),
            Err(e) => warn!(error = %e, "session cleanup failed"),
        }
    }
}
