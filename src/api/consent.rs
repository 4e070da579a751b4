/// Consent endpoints
///
/// Recording and updating consent is public; reading and deleting records is
/// limited to administrators.
use crate::{
    auth::RequestContext,
    consent::{ConsentIdentifier, ConsentPayload},
    context::AppContext,
    error::ApiResult,
    roles::Role,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

pub fn public_routes() -> Router<AppContext> {
    Router::new()
        .route("/consent", post(create_consent))
        .route("/consent-update", post(update_consent))
}

pub fn admin_routes() -> Router<AppContext> {
    Router::new()
        .route("/consents", get(list_consents))
        .route("/consent/:id", get(show_consent))
        .route("/consent-by-identifier", post(consent_by_identifier))
        .route("/consent-destroy", post(destroy_consent))
}

async fn create_consent(
    State(ctx): State<AppContext>,
    Json(payload): Json<ConsentPayload>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let consent = ctx.consents.create(payload).await?;

    Ok((StatusCode::CREATED, Json(json!({ "consent": consent }))))
}

async fn update_consent(
    State(ctx): State<AppContext>,
    Json(payload): Json<ConsentPayload>,
) -> ApiResult<Json<Value>> {
    let consent = ctx.consents.update(payload).await?;

    Ok(Json(json!({ "consent": consent })))
}

async fn list_consents(
    State(ctx): State<AppContext>,
    auth: RequestContext,
) -> ApiResult<Json<Value>> {
    auth.require_role(Role::ADMINS)?;

    let consents = ctx.consents.list().await?;
    Ok(Json(json!({ "consents": consents })))
}

async fn show_consent(
    State(ctx): State<AppContext>,
    auth: RequestContext,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    auth.require_role(Role::ADMINS)?;

    let consent = ctx.consents.find_by_id(id).await?;
    Ok(Json(json!({ "consent": consent })))
}

async fn consent_by_identifier(
    State(ctx): State<AppContext>,
    auth: RequestContext,
    Json(identifier): Json<ConsentIdentifier>,
) -> ApiResult<Json<Value>> {
    auth.require_role(Role::ADMINS)?;

    let consent = ctx.consents.find(identifier).await?;
    Ok(Json(json!({ "consent": consent })))
}

async fn destroy_consent(
    State(ctx): State<AppContext>,
    auth: RequestContext,
    Json(identifier): Json<ConsentIdentifier>,
) -> ApiResult<Json<Value>> {
    auth.require_role(Role::ADMINS)?;

    ctx.consents.destroy(identifier).await?;
    Ok(Json(json!({ "msg": "ConsentDeleted" })))
}
