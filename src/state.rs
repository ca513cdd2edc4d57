use std::sync::Arc;

use crate::auth::{
    repo::{PgUserStore, UserStore},
    services::AuthService,
};
use crate::config::AppConfig;
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config.database).await?;
        db::migrate(&pool).await;

        let store = Arc::new(PgUserStore::new(pool)) as Arc<dyn UserStore>;
        Self::from_parts(store, config)
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: &AppConfig) -> anyhow::Result<Self> {
        let auth = AuthService::new(store, &config.auth)?;
        Ok(Self {
            auth: Arc::new(auth),
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::auth::memory::MemoryUserStore;

        let store = Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>;
        let auth = AuthService::new(store, &crate::config::test_auth_config())
            .expect("test auth config is valid");
        Self {
            auth: Arc::new(auth),
        }
    }
}
