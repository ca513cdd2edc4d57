use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthSession, LoginRequest, PublicUser, RegisterRequest},
        jwt::JwtKeys,
        password::{PasswordHashing, MIN_PASSWORD_LEN},
        repo::UserStore,
        repo_types::{normalize_email, AuthProvider, NewUser, User, UserLookup},
    },
    config::AuthConfig,
    error::AppError,
};

/// Register and login over a [`UserStore`].
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
    hashing: PasswordHashing,
}

/// Treats empty strings like absent fields.
fn present(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.is_empty())
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, cfg: &AuthConfig) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            keys: JwtKeys::from(&cfg.jwt),
            hashing: PasswordHashing::new(&cfg.password)?,
        })
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    #[instrument(skip(self, payload))]
    pub async fn register(&self, payload: RegisterRequest) -> Result<AuthSession, AppError> {
        let (Some(full_name), Some(email), Some(username), Some(student_number), Some(password)) = (
            present(payload.full_name),
            present(payload.email.map(|e| normalize_email(&e))),
            present(payload.username),
            present(payload.student_number),
            present(payload.password),
        ) else {
            warn!("register missing fields");
            return Err(AppError::Validation("Missing required fields".into()));
        };

        // UTF-16 code units, the unit JSON clients measure string length in
        if password.encode_utf16().count() < MIN_PASSWORD_LEN {
            warn!("password too short");
            return Err(AppError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        // Fast path only; the store's unique constraints decide on insert.
        for lookup in [
            UserLookup::Email(email.clone()),
            UserLookup::Username(username.clone()),
            UserLookup::StudentNumber(student_number.clone()),
        ] {
            if self.store.find_one(&lookup).await?.is_some() {
                warn!(field = %lookup.field(), "register duplicate");
                return Err(AppError::Conflict(lookup.field()));
            }
        }

        let hashing = self.hashing.clone();
        let password_hash = tokio::task::spawn_blocking(move || hashing.hash(&password))
            .await
            .context("password hashing task")??;

        let user = self
            .store
            .insert(NewUser {
                full_name,
                email,
                username,
                student_number,
                password_hash: Some(password_hash),
                auth_provider: AuthProvider::Local,
            })
            .await
            .inspect_err(|e| warn!(error = %e, "insert user rejected"))?;

        let session = self.issue(user)?;
        info!(user_id = %session.user.id, email = %session.user.email, "user registered");
        Ok(session)
    }

    #[instrument(skip(self, payload))]
    pub async fn login(&self, payload: LoginRequest) -> Result<AuthSession, AppError> {
        let (Some(identifier), Some(password)) =
            (present(payload.email_or_username), present(payload.password))
        else {
            warn!("login missing credentials");
            return Err(AppError::Validation("Missing credentials".into()));
        };

        let lookup = UserLookup::from_identifier(&identifier);
        let Some(user) = self.store.find_one(&lookup).await? else {
            warn!(field = %lookup.field(), "login unknown identifier");
            return Err(AppError::InvalidCredentials);
        };

        let stored_hash = match (&user.auth_provider, &user.password_hash) {
            (AuthProvider::Local, Some(hash)) => hash.clone(),
            _ => {
                warn!(
                    user_id = %user.id,
                    provider = user.auth_provider.as_str(),
                    "login without local password"
                );
                return Err(AppError::InvalidCredentials);
            }
        };

        let hashing = self.hashing.clone();
        let verified = tokio::task::spawn_blocking(move || hashing.verify(&password, &stored_hash))
            .await
            .context("password verification task")?;
        let ok = match verified {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, user_id = %user.id, "stored password hash unreadable");
                false
            }
        };

        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let session = self.issue(user)?;
        info!(user_id = %session.user.id, "user logged in");
        Ok(session)
    }

    fn issue(&self, user: User) -> Result<AuthSession, AppError> {
        let token = self.keys.sign(user.id).context("sign token")?;
        Ok(AuthSession {
            token,
            user: PublicUser::from(user),
        })
    }
}
