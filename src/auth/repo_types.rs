use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Where a user's credential comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    External,
}

impl AuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::External => "external",
        }
    }
}

impl FromStr for AuthProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(AuthProvider::Local),
            "external" => Ok(AuthProvider::External),
            other => anyhow::bail!("unknown auth provider {other:?}"),
        }
    }
}

/// User record as held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub student_number: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 PHC string, absent for external accounts
    pub auth_provider: AuthProvider,
    pub created_at: OffsetDateTime,
}

/// Raw `users` row; `auth_provider` is stored as text.
#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub student_number: String,
    pub password_hash: Option<String>,
    pub auth_provider: String,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            auth_provider: r.auth_provider.parse()?,
            id: r.id,
            full_name: r.full_name,
            email: r.email,
            username: r.username,
            student_number: r.student_number,
            password_hash: r.password_hash,
            created_at: r.created_at,
        })
    }
}

/// Fields supplied on insert; the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub student_number: String,
    pub password_hash: Option<String>,
    pub auth_provider: AuthProvider,
}

/// Fields that must be unique across all users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
    StudentNumber,
}

impl UniqueField {
    pub fn label(self) -> &'static str {
        match self {
            UniqueField::Email => "Email",
            UniqueField::Username => "Username",
            UniqueField::StudentNumber => "Student number",
        }
    }

    pub(crate) fn column(self) -> &'static str {
        match self {
            UniqueField::Email => "email",
            UniqueField::Username => "username",
            UniqueField::StudentNumber => "student_number",
        }
    }

    /// Maps a Postgres constraint name from the `users` migration back to its field.
    pub(crate) fn from_constraint(name: &str) -> Option<Self> {
        match name {
            "users_email_key" => Some(UniqueField::Email),
            "users_username_key" => Some(UniqueField::Username),
            "users_student_number_key" => Some(UniqueField::StudentNumber),
            _ => None,
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Single-field equality lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Email(String),
    Username(String),
    StudentNumber(String),
}

impl UserLookup {
    /// Login identifiers containing `@` are emails (matched lowercased),
    /// anything else is an exact username.
    pub fn from_identifier(identifier: &str) -> Self {
        if identifier.contains('@') {
            UserLookup::Email(normalize_email(identifier))
        } else {
            UserLookup::Username(identifier.to_string())
        }
    }

    pub fn field(&self) -> UniqueField {
        match self {
            UserLookup::Email(_) => UniqueField::Email,
            UserLookup::Username(_) => UniqueField::Username,
            UserLookup::StudentNumber(_) => UniqueField::StudentNumber,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            UserLookup::Email(v) | UserLookup::Username(v) | UserLookup::StudentNumber(v) => v,
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        match self {
            UserLookup::Email(v) => user.email == *v,
            UserLookup::Username(v) => user.username == *v,
            UserLookup::StudentNumber(v) => user.student_number == *v,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
