use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{
    repo::{StoreError, UserStore},
    repo_types::{NewUser, User, UserLookup},
};

/// In-process store with the same uniqueness guarantees as the `users` table.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.lock().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend(anyhow::anyhow!("user store lock poisoned"))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_one(&self, lookup: &UserLookup) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().map_err(|_| poisoned())?;
        Ok(users.iter().find(|u| lookup.matches(u)).cloned())
    }

    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().map_err(|_| poisoned())?;
        let unique = [
            UserLookup::Email(new.email.clone()),
            UserLookup::Username(new.username.clone()),
            UserLookup::StudentNumber(new.student_number.clone()),
        ];
        if let Some(taken) = unique.iter().find(|l| users.iter().any(|u| l.matches(u))) {
            return Err(StoreError::UniqueViolation(taken.field()));
        }

        let user = User {
            id: Uuid::new_v4(),
            full_name: new.full_name,
            email: new.email,
            username: new.username,
            student_number: new.student_number,
            password_hash: new.password_hash,
            auth_provider: new.auth_provider,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::{AuthProvider, UniqueField};

    fn new_user(email: &str, username: &str, student_number: &str) -> NewUser {
        NewUser {
            full_name: "Test User".into(),
            email: email.into(),
            username: username.into(),
            student_number: student_number.into(),
            password_hash: None,
            auth_provider: AuthProvider::External,
        }
    }

    #[tokio::test]
    async fn insert_assigns_distinct_ids() {
        let store = MemoryUserStore::new();
        let a = store.insert(new_user("a@x.com", "a", "S1")).await.unwrap();
        let b = store.insert(new_user("b@x.com", "b", "S2")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn insert_rejects_each_duplicate_field() {
        let store = MemoryUserStore::new();
        store.insert(new_user("a@x.com", "a", "S1")).await.unwrap();

        let cases = [
            (new_user("a@x.com", "z", "S9"), UniqueField::Email),
            (new_user("z@x.com", "a", "S9"), UniqueField::Username),
            (new_user("z@x.com", "z", "S1"), UniqueField::StudentNumber),
        ];
        for (candidate, expected) in cases {
            match store.insert(candidate).await {
                Err(StoreError::UniqueViolation(field)) => assert_eq!(field, expected),
                other => panic!("expected unique violation on {expected}, got {other:?}"),
            }
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn find_one_by_each_field() {
        let store = MemoryUserStore::new();
        let created = store.insert(new_user("a@x.com", "ab", "S1")).await.unwrap();

        for lookup in [
            UserLookup::Email("a@x.com".into()),
            UserLookup::Username("ab".into()),
            UserLookup::StudentNumber("S1".into()),
        ] {
            let found = store.find_one(&lookup).await.unwrap().expect("user present");
            assert_eq!(found.id, created.id);
        }
        assert!(store
            .find_one(&UserLookup::Username("AB".into()))
            .await
            .unwrap()
            .is_none());
    }
}
