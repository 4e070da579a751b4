/// Application context and dependency injection
use crate::{
    account::AccountManager,
    avatar::{AvatarStore, HttpImageFetcher, ImageFetcher},
    config::ServerConfig,
    consent::ConsentService,
    db,
    error::{ApiError, ApiResult},
    oauth::{GoogleProvider, OAuthProvider},
    profile::ProfileService,
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub profiles: Arc<ProfileService>,
    pub consents: Arc<ConsentService>,
    pub oauth: Arc<dyn OAuthProvider>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let images = HttpImageFetcher::new(
            AvatarStore::new(config.storage.public_directory.clone()),
            Duration::from_secs(config.avatar.fetch_timeout),
            config.avatar.max_upload_bytes,
        )?;
        let oauth = GoogleProvider::new(config.oauth.clone())?;

        Self::with_services(config, db, Arc::new(images), Arc::new(oauth))
    }

    /// Assemble the context around an existing pool and collaborators
    pub fn with_services(
        config: ServerConfig,
        db: SqlitePool,
        images: Arc<dyn ImageFetcher>,
        oauth: Arc<dyn OAuthProvider>,
    ) -> ApiResult<Self> {
        let account_manager = Arc::new(AccountManager::new(db.clone(), &config, images)?);

        let profiles = Arc::new(ProfileService::new(
            db.clone(),
            AvatarStore::new(config.storage.public_directory.clone()),
            config.avatar.max_upload_bytes,
        ));
        let consents = Arc::new(ConsentService::new(db.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            db,
            account_manager,
            profiles,
            consents,
            oauth,
            rate_limiter,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> ApiResult<()> {
        let dirs = [
            &config.storage.data_directory,
            &config.storage.public_directory,
        ];

        for dir in dirs {
            if !dir.exists() {
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    ApiError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
                })?;
            }
        }

        tokio::fs::create_dir_all(config.storage.public_directory.join("avatars")).await?;

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
