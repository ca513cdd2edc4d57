use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use crate::auth::repo_types::{NewUser, UniqueField, User, UserLookup, UserRow};

const USER_COLUMNS: &str =
    "id, full_name, email, username, student_number, password_hash, auth_provider, created_at";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused a write because a unique field is already taken.
    #[error("unique constraint violated on {0}")]
    UniqueViolation(UniqueField),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence seam for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_one(&self, lookup: &UserLookup) -> Result<Option<User>, StoreError>;

    /// Inserts a record. Uniqueness is enforced here, whatever the caller checked before.
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_one(&self, lookup: &UserLookup) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} = $1",
            lookup.field().column()
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(lookup.value())
            .fetch_optional(&self.db)
            .await
            .map_err(|e| {
                anyhow::Error::new(e).context(format!("find user by {}", lookup.field()))
            })?;

        row.map(User::try_from).transpose().map_err(StoreError::Backend)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users
                (full_name, email, username, student_number, password_hash, auth_provider)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.full_name)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.student_number)
            .bind(user.password_hash.as_deref())
            .bind(user.auth_provider.as_str())
            .fetch_one(&self.db)
            .await
            .map_err(map_insert_error)?;

        debug!(user_id = %row.id, "user row inserted");
        Ok(User::try_from(row)?)
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            if let Some(field) = db_err.constraint().and_then(UniqueField::from_constraint) {
                return StoreError::UniqueViolation(field);
            }
        }
    }
    StoreError::Backend(anyhow::Error::new(err).context("insert user"))
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use sqlx::error::{DatabaseError, ErrorKind};

    use super::*;

    #[derive(Debug, Error)]
    #[error("{message}")]
    struct FakeDbError {
        message: String,
        kind: ErrorKind,
        constraint: Option<&'static str>,
    }

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            &self.message
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.kind {
                ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
                ErrorKind::CheckViolation => ErrorKind::CheckViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn db_error(kind: ErrorKind, constraint: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError {
            message: "rejected".into(),
            kind,
            constraint,
        }))
    }

    #[test]
    fn named_unique_constraints_map_to_their_field() {
        let cases = [
            ("users_email_key", UniqueField::Email),
            ("users_username_key", UniqueField::Username),
            ("users_student_number_key", UniqueField::StudentNumber),
        ];
        for (constraint, field) in cases {
            let err = map_insert_error(db_error(ErrorKind::UniqueViolation, Some(constraint)));
            assert!(
                matches!(err, StoreError::UniqueViolation(f) if f == field),
                "{constraint} mapped to {err:?}"
            );
        }
    }

    #[test]
    fn unknown_unique_constraint_is_a_backend_error() {
        let err = map_insert_error(db_error(ErrorKind::UniqueViolation, Some("users_pkey")));
        assert!(matches!(err, StoreError::Backend(_)));

        let err = map_insert_error(db_error(ErrorKind::UniqueViolation, None));
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn other_database_errors_are_backend_errors() {
        let err = map_insert_error(db_error(ErrorKind::CheckViolation, Some("users_email_key")));
        assert!(matches!(err, StoreError::Backend(_)));

        let err = map_insert_error(sqlx::Error::RowNotFound);
        match err {
            StoreError::Backend(e) => assert_eq!(e.to_string(), "insert user"),
            other => panic!("expected backend error, got {other:?}"),
        }
    }
}
