use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo_types::{AuthProvider, User};

/// Request body for user registration.
/// Fields are optional so missing ones become a 400, not a parse error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub student_number: Option<String>,
    pub password: Option<String>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email_or_username: Option<String>,
    pub password: Option<String>,
}

/// Token plus public view, produced by register and login.
#[derive(Debug)]
pub struct AuthSession {
    pub token: String,
    pub user: PublicUser,
}

/// Response returned after register or login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub token: String,
    pub user: PublicUser,
}

impl AuthResponse {
    pub fn new(message: &'static str, session: AuthSession) -> Self {
        Self {
            message,
            token: session.token,
            user: session.user,
        }
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub student_number: String,
    pub auth_provider: AuthProvider,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            full_name: u.full_name,
            email: u.email,
            username: u.username,
            student_number: u.student_number,
            auth_provider: u.auth_provider,
        }
    }
}
