/// Sign-in, sign-up, guest and OAuth endpoints
use crate::{
    account::{DomainSessionResponse, IdentitySnapshot, SessionResponse, SignInRequest, SignUpRequest},
    api::middleware::request_origin,
    auth::RequestContext,
    context::AppContext,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

/// Routes reachable without a session
pub fn public_routes() -> Router<AppContext> {
    Router::new()
        .route("/sign-up", post(sign_up))
        .route("/sign-in", post(sign_in))
        .route("/sign-in-domain", post(sign_in_domain))
        .route("/login-google", get(login_google))
        .route("/google-callback", get(google_callback))
}

/// Routes that require a session
pub fn protected_routes() -> Router<AppContext> {
    Router::new()
        .route("/logout", get(logout))
        .route("/logout-all", post(logout_all))
        .route("/session", get(session))
}

async fn sign_up(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(req): Json<SignUpRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    req.validate()?;

    let origin = request_origin(&headers);
    let session = ctx.account_manager.sign_up(&req, origin.as_deref()).await?;

    Ok((StatusCode::CREATED, Json(session)))
}

async fn sign_in(
    State(ctx): State<AppContext>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    req.validate()?;

    let session = ctx.account_manager.sign_in(&req).await?;

    Ok((StatusCode::CREATED, Json(session)))
}

async fn sign_in_domain(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<DomainSessionResponse>)> {
    let origin = request_origin(&headers)
        .ok_or_else(|| ApiError::UnauthorizedDomain("request has no origin".to_string()))?;

    let session = ctx.account_manager.sign_in_domain(&origin).await?;

    Ok((StatusCode::CREATED, Json(session)))
}

async fn logout(State(ctx): State<AppContext>, auth: RequestContext) -> ApiResult<Json<Value>> {
    ctx.account_manager.logout(&auth.token).await?;
    tracing::info!(account_id = auth.account_id, "Logged out");

    Ok(Json(json!({ "msg": "LoggedOut" })))
}

async fn logout_all(State(ctx): State<AppContext>, auth: RequestContext) -> ApiResult<Json<Value>> {
    let revoked = ctx.account_manager.logout_all(auth.account_id).await?;
    tracing::info!(account_id = auth.account_id, revoked, "Logged out everywhere");

    Ok(Json(json!({ "msg": "LoggedOut", "revoked": revoked })))
}

async fn session(auth: RequestContext) -> Json<IdentitySnapshot> {
    Json(auth.identity)
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    store_id: Option<String>,
}

/// Send the browser to the provider, carrying the tenant id as state
async fn login_google(
    State(ctx): State<AppContext>,
    Query(query): Query<LoginQuery>,
) -> ApiResult<Redirect> {
    let store_id = parse_store_id(query.store_id.as_deref())?;
    let state = store_id.map(|id| id.to_string());

    Ok(Redirect::to(&ctx.oauth.authorize_url(state.as_deref())))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn parse_store_id(raw: Option<&str>) -> ApiResult<Option<i64>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::Validation(format!("store_id: not a number: {}", raw))),
        None => Ok(None),
    }
}

/// Provider callback
///
/// With a tenant in the state the browser is sent back to the tenant domain
/// with the session in the `user` query parameter; otherwise the session is
/// returned as JSON.
async fn google_callback(
    State(ctx): State<AppContext>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Response> {
    if let Some(error) = query.error {
        tracing::warn!(error = %error, "Provider reported an authorization error");
        return Err(ApiError::Authentication(format!("Provider error: {}", error)));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::Authentication("Missing authorization code".to_string()))?;
    let store_id = parse_store_id(query.state.as_deref())?;

    let profile = ctx.oauth.exchange(&code).await?;
    let outcome = ctx
        .account_manager
        .oauth_sign_in(ctx.oauth.name(), &profile, store_id)
        .await?;

    match outcome.store {
        Some(store) => {
            let payload = serde_json::to_string(&outcome.session)
                .map_err(|e| ApiError::Internal(format!("Failed to encode session: {}", e)))?;
            let target = format!(
                "{}?user={}",
                store.domain.trim_end_matches('/'),
                urlencoding::encode(&payload)
            );
            Ok(Redirect::to(&target).into_response())
        }
        None => Ok((StatusCode::OK, Json(outcome.session)).into_response()),
    }
}
