/// Storefront auth - multi-tenant storefront backend
///
/// Accounts, revocable session tokens, tenant guest sign-in, OAuth account
/// linking, profiles and consent records over HTTP.

mod account;
mod api;
mod auth;
mod avatar;
mod config;
mod consent;
mod context;
mod db;
mod error;
mod jobs;
mod oauth;
mod profile;
mod rate_limit;
mod roles;
mod server;
#[cfg(test)]
mod test_support;

use config::{LoggingConfig, ServerConfig};
use context::AppContext;
use error::ApiResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storefront_auth=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ApiResult<()> {
    // Load configuration (also reads .env)
    let config = ServerConfig::from_env()?;

    init_logging(&config.logging);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.logging.level,
        "Starting storefront auth"
    );

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}
