/// API routes and handlers
pub mod auth;
pub mod consent;
pub mod middleware;
pub mod profile;

use crate::context::AppContext;
use axum::{extract::DefaultBodyLimit, middleware::from_fn_with_state, Router};

/// Multipart overhead allowed on top of the avatar size limit
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build API routes, mounted under `/api`
pub fn routes(ctx: AppContext) -> Router<AppContext> {
    let public = Router::new()
        .merge(auth::public_routes())
        .merge(consent::public_routes());

    let protected = Router::new()
        .merge(auth::protected_routes())
        .merge(profile::routes())
        .merge(consent::admin_routes())
        .route_layer(from_fn_with_state(ctx.clone(), middleware::require_session));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(
            ctx.config.avatar.max_upload_bytes + FORM_OVERHEAD_BYTES,
        ))
}
