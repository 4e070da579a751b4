/// Configuration management for the storefront backend
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub oauth: OAuthConfig,
    pub avatar: AvatarConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// CORS allow-list; empty means any origin
    pub allowed_origins: Vec<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    /// Root for stored images (`avatars/...` paths are relative to it)
    pub public_directory: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Session token lifetime in seconds
    pub token_ttl: i64,
    /// Argon2 iteration count
    pub password_hash_cost: u32,
    /// Argon2 memory in KiB
    pub password_hash_memory_kib: u32,
}

/// OAuth provider configuration (Google)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

/// Avatar handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarConfig {
    /// Timeout for downloading provider images, in seconds
    pub fetch_timeout: u64,
    pub max_upload_bytes: usize,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub auth_requests_per_second: u32,
    pub general_requests_per_second: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("STOREFRONT_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("STOREFRONT_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ApiError::Validation("Invalid port number".to_string()))?;
        let allowed_origins = env::var("STOREFRONT_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let data_directory: PathBuf = env::var("STOREFRONT_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("STOREFRONT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("storefront.sqlite"));
        let public_directory = env::var("STOREFRONT_PUBLIC_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./public"));

        let jwt_secret = env::var("STOREFRONT_JWT_SECRET")
            .map_err(|_| ApiError::Validation("JWT secret required".to_string()))?;
        let token_ttl = env_or("STOREFRONT_TOKEN_TTL", 7 * 24 * 3600);
        let password_hash_cost = env_or("STOREFRONT_PASSWORD_HASH_COST", 2);
        let password_hash_memory_kib = env_or("STOREFRONT_PASSWORD_HASH_MEMORY_KIB", 19456);

        let oauth = OAuthConfig {
            client_id: env::var("STOREFRONT_GOOGLE_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("STOREFRONT_GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri: env::var("STOREFRONT_GOOGLE_REDIRECT_URI")
                .unwrap_or_else(|_| format!("http://localhost:{}/api/google-callback", port)),
            authorize_url: env::var("STOREFRONT_GOOGLE_AUTHORIZE_URL")
                .unwrap_or_else(|_| "https://accounts.google.com/o/oauth2/v2/auth".to_string()),
            token_url: env::var("STOREFRONT_GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            userinfo_url: env::var("STOREFRONT_GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| "https://openidconnect.googleapis.com/v1/userinfo".to_string()),
        };

        let avatar = AvatarConfig {
            fetch_timeout: env_or("STOREFRONT_AVATAR_FETCH_TIMEOUT", 5),
            max_upload_bytes: env_or("STOREFRONT_AVATAR_MAX_UPLOAD_BYTES", 2 * 1024 * 1024),
        };

        let rate_limit = RateLimitConfig {
            enabled: env_or("STOREFRONT_RATE_LIMITS_ENABLED", true),
            auth_requests_per_second: env_or("STOREFRONT_RATE_LIMIT_AUTH_RPS", 10),
            general_requests_per_second: env_or("STOREFRONT_RATE_LIMIT_GENERAL_RPS", 100),
            burst_size: env_or("STOREFRONT_RATE_LIMIT_BURST", 20),
        };

        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let json = env::var("STOREFRONT_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                allowed_origins,
            },
            storage: StorageConfig {
                data_directory,
                database,
                public_directory,
            },
            authentication: AuthConfig {
                jwt_secret,
                token_ttl,
                password_hash_cost,
                password_hash_memory_kib,
            },
            oauth,
            avatar,
            rate_limit,
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ApiError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.token_ttl <= 0 {
            return Err(ApiError::Validation("Token TTL must be positive".to_string()));
        }

        if !(1..=10).contains(&self.authentication.password_hash_cost) {
            return Err(ApiError::Validation(
                "Password hash cost must be between 1 and 10".to_string(),
            ));
        }

        Ok(())
    }
}
