use serde::{Deserialize, Serialize};

use super::repo_types::{AuthProvider, User};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for the federated session exchange.
#[derive(Debug, Deserialize)]
pub struct FederatedSessionRequest {
    pub session_id: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub auth_provider: AuthProvider,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            name: u.name,
            picture: u.picture,
            auth_provider: u.auth_provider,
        }
    }
}

/// Returned after register, login or federated exchange; the cookie carries the same token.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub user: PublicUser,
    pub session_token: String,
}
