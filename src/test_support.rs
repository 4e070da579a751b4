//! Shared fixtures for unit tests
use crate::{
    account::ProviderProfile,
    avatar::ImageFetcher,
    config::{
        AuthConfig, AvatarConfig, LoggingConfig, OAuthConfig, RateLimitConfig, ServerConfig,
        ServiceConfig, StorageConfig,
    },
    context::AppContext,
    db::{profile::DEFAULT_AVATAR, DatabaseOptions},
    error::{ApiError, ApiResult},
    oauth::OAuthProvider,
};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::{path::PathBuf, sync::Arc};

pub const TEST_SECRET: &str = "test-secret-that-is-at-least-32-characters";

/// Configuration with cheap password hashing and rate limits off
pub fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 8080,
            allowed_origins: vec![],
        },
        storage: StorageConfig {
            data_directory: PathBuf::from("/tmp/storefront-test"),
            database: PathBuf::from(":memory:"),
            public_directory: std::env::temp_dir().join("storefront-test-public"),
        },
        authentication: AuthConfig {
            jwt_secret: TEST_SECRET.to_string(),
            token_ttl: 3600,
            password_hash_cost: 1,
            password_hash_memory_kib: 1024,
        },
        oauth: OAuthConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8080/api/google-callback".to_string(),
            authorize_url: "https://accounts.example/auth".to_string(),
            token_url: "https://accounts.example/token".to_string(),
            userinfo_url: "https://accounts.example/userinfo".to_string(),
        },
        avatar: AvatarConfig {
            fetch_timeout: 1,
            max_upload_bytes: 64 * 1024,
        },
        rate_limit: RateLimitConfig {
            enabled: false,
            auth_requests_per_second: 10,
            general_requests_per_second: 100,
            burst_size: 20,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            json: false,
        },
    }
}

/// Single-connection in-memory database with migrations applied
///
/// One connection keeps every query on the same in-memory database; tests must
/// not touch the pool while holding a transaction from it.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    crate::db::run_migrations(&pool).await.unwrap();
    pool
}

/// File-backed WAL database with the production pool options
///
/// Unlike `test_pool`, transactions on separate connections really overlap.
/// The directory must outlive the pool.
pub async fn file_pool() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = crate::db::create_pool(&dir.path().join("storefront.db"), DatabaseOptions::default())
        .await
        .unwrap();

    crate::db::run_migrations(&pool).await.unwrap();
    (pool, dir)
}

/// Application context over an in-memory database and stub collaborators
///
/// Each context gets its own public directory so stored avatars do not collide.
pub async fn test_context() -> AppContext {
    test_context_with(StubImageFetcher::default(), StubOAuthProvider::default()).await
}

pub async fn test_context_with(images: StubImageFetcher, oauth: StubOAuthProvider) -> AppContext {
    let mut config = test_config();
    config.storage.public_directory =
        std::env::temp_dir().join(format!("storefront-test-{}", uuid::Uuid::new_v4()));

    AppContext::with_services(config, test_pool().await, Arc::new(images), Arc::new(oauth))
        .unwrap()
}

/// Image fetcher that returns a fixed path without touching the network
#[derive(Clone)]
pub struct StubImageFetcher {
    path: String,
}

impl StubImageFetcher {
    pub fn returning(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

impl Default for StubImageFetcher {
    /// Behaves like a failed download
    fn default() -> Self {
        Self::returning(DEFAULT_AVATAR)
    }
}

#[async_trait]
impl ImageFetcher for StubImageFetcher {
    async fn fetch_avatar(&self, _url: &str, _profile_id: i64) -> String {
        self.path.clone()
    }
}

/// OAuth provider that accepts the code "good" and yields a fixed profile
#[derive(Clone)]
pub struct StubOAuthProvider {
    pub profile: ProviderProfile,
}

impl Default for StubOAuthProvider {
    fn default() -> Self {
        Self {
            profile: ProviderProfile {
                external_id: "g-123".to_string(),
                display_name: "Ana Lopez".to_string(),
                email: "ana@x.com".to_string(),
                image: None,
            },
        }
    }
}

#[async_trait]
impl OAuthProvider for StubOAuthProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorize_url(&self, state: Option<&str>) -> String {
        format!("https://accounts.example/auth?state={}", state.unwrap_or_default())
    }

    async fn exchange(&self, code: &str) -> ApiResult<ProviderProfile> {
        if code == "good" {
            Ok(self.profile.clone())
        } else {
            Err(ApiError::Authentication("Code exchange failed".to_string()))
        }
    }
}
