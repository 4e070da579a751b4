/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{ApiError, ApiResult},
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let values: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring unparsable CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    let images = ServeDir::new(&ctx.config.storage.public_directory);

    Router::new()
        // Health check endpoint (no middleware)
        .route("/health", get(health_check))
        .nest("/api", crate::api::routes(ctx.clone()))
        .nest_service("/api/images", images)
        // Registered before the layers so unknown paths are wrapped too
        .fallback(not_found)
        // Provide state - converts Router<AppContext> to Router<()>
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(ctx.clone(), rate_limit_middleware))
        .layer(cors_layer(&ctx.config.service.allowed_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, draining connections");
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> ApiResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Storefront auth listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::CredentialVerifier,
        avatar::tests::PNG_BYTES,
        config::RateLimitConfig,
        db::{
            account::{self, NewAccount},
            profile::{self, ProfileFields},
            tenant,
        },
        roles::Role,
        test_support::{
            test_config, test_context, test_context_with, test_pool, StubImageFetcher,
            StubOAuthProvider,
        },
    };
    use std::sync::Arc;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_with_token(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn sign_up(app: &Router, name: &str) -> Value {
        let response = send(
            app,
            post_json(
                "/api/sign-up",
                json!({
                    "name": name,
                    "email": format!("{}@x.com", name),
                    "password": "secret1",
                    "fullName": "Ana Lopez",
                    "role": "user"
                }),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    /// Seed an administrator directly and sign in as them
    async fn admin_token(ctx: &AppContext, app: &Router) -> String {
        let hash = CredentialVerifier::new(&test_config().authentication)
            .unwrap()
            .hash("rootpass")
            .unwrap();
        let mut conn = ctx.db.acquire().await.unwrap();
        let admin = account::insert(
            &mut conn,
            &NewAccount {
                name: "root".to_string(),
                email: Some("root@x.com".to_string()),
                password_hash: Some(hash),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        profile::insert(
            &mut conn,
            admin.id,
            &ProfileFields {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        drop(conn);

        let response = send(
            app,
            post_json(
                "/api/sign-in",
                json!({"email": "root@x.com", "password": "rootpass"}),
                None,
            ),
        )
        .await;
        body_json(response).await["token"].as_str().unwrap().to_string()
    }

    fn multipart_request(uri: &str, token: &str, fields: &[(&str, &str)], png: bool) -> Request<Body> {
        let boundary = "storefront-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    boundary, name, value
                )
                .as_bytes(),
            );
        }
        if png {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"avatarUrl\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\n",
                    boundary
                )
                .as_bytes(),
            );
            body.extend_from_slice(PNG_BYTES);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_fallback() {
        let app = build_router(test_context().await);

        let response = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");

        let response = send(&app, Request::get("/nope").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_unknown_paths_go_through_layers() {
        let mut config = test_config();
        config.rate_limit = RateLimitConfig {
            enabled: true,
            auth_requests_per_second: 1,
            general_requests_per_second: 1,
            burst_size: 1,
        };
        let ctx = AppContext::with_services(
            config,
            test_pool().await,
            Arc::new(StubImageFetcher::default()),
            Arc::new(StubOAuthProvider::default()),
        )
        .unwrap();
        let app = build_router(ctx);

        let unknown = || {
            Request::get("/nope")
                .header(header::ORIGIN, "https://loja.example")
                .body(Body::empty())
                .unwrap()
        };

        let response = send(&app, unknown()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );

        let response = send(&app, unknown()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_sign_up_sign_in_session_logout() {
        let app = build_router(test_context().await);

        let created = sign_up(&app, "ana").await;
        assert_eq!(created["role"], "user");
        assert_eq!(created["fullName"], "Ana Lopez");
        assert!(!created["token"].as_str().unwrap().is_empty());

        let response = send(
            &app,
            post_json(
                "/api/sign-in",
                json!({"email": "ana@x.com", "password": "secret1"}),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let session = body_json(response).await;
        assert_eq!(session["id"], created["id"]);
        let token = session["token"].as_str().unwrap().to_string();

        let response = send(&app, get_with_token("/api/session", &token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], created["id"]);

        let response = send(&app, get_with_token("/api/logout", &token)).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Revoked tokens look like any other invalid token
        let response = send(&app, get_with_token("/api/session", &token)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sign_in_unknown_and_invalid_payload() {
        let app = build_router(test_context().await);

        let response = send(
            &app,
            post_json(
                "/api/sign-in",
                json!({"email": "ghost@x.com", "password": "secret1"}),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            &app,
            post_json(
                "/api/sign-up",
                json!({"email": "not-an-email", "password": "secret1"}),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "ValidationError");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = build_router(test_context().await);

        let response = send(&app, Request::get("/api/session").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(&app, get_with_token("/api/session", "garbage")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_domain_sign_in() {
        let ctx = test_context().await;
        let mut conn = ctx.db.acquire().await.unwrap();
        tenant::insert(&mut conn, "Shop", "https://shop.example").await.unwrap();
        drop(conn);
        let app = build_router(ctx);

        let request = || {
            Request::post("/api/sign-in-domain")
                .header(header::ORIGIN, "https://shop.example")
                .body(Body::empty())
                .unwrap()
        };

        let response = send(&app, request()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let first = body_json(response).await;
        assert_eq!(first["role"], "invitado");
        assert_eq!(first["stores"]["visits"], 1);

        let second = body_json(send(&app, request()).await).await;
        assert_eq!(first["id"], second["id"]);

        let response = send(
            &app,
            Request::post("/api/sign-in-domain")
                .header(header::HOST, "evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "UnauthorizedDomain");
    }

    #[tokio::test]
    async fn test_google_callback_redirects_to_tenant() {
        let ctx = test_context_with(StubImageFetcher::default(), StubOAuthProvider::default()).await;
        let mut conn = ctx.db.acquire().await.unwrap();
        let store = tenant::insert(&mut conn, "Shop", "https://shop.example/").await.unwrap();
        drop(conn);
        let app = build_router(ctx);

        let uri = format!("/api/google-callback?code=good&state={}", store.id);
        let response = send(&app, Request::get(uri).body(Body::empty()).unwrap()).await;
        assert!(response.status().is_redirection());
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://shop.example?user=%7B"));

        let response = send(
            &app,
            Request::get("/api/google-callback?code=good").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["email"], "ana@x.com");

        let response = send(
            &app,
            Request::get("/api/google-callback?code=bad").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_google_redirect_carries_store() {
        let app = build_router(test_context().await);

        let response = send(
            &app,
            Request::get("/api/login-google?store_id=5").body(Body::empty()).unwrap(),
        )
        .await;
        assert!(response.status().is_redirection());
        assert!(response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .ends_with("state=5"));
    }

    #[tokio::test]
    async fn test_profile_routes_enforce_roles() {
        let ctx = test_context().await;
        let app = build_router(ctx.clone());
        let user = sign_up(&app, "ana").await;
        let user_token = user["token"].as_str().unwrap();

        let response = send(
            &app,
            post_json("/api/profile-by-user-id", json!({}), Some(user_token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["profile"]["userId"], user["id"]);

        let response = send(
            &app,
            post_json("/api/profile-destroy", json!({"id": user["profileId"]}), Some(user_token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_manages_profiles() {
        let ctx = test_context().await;
        let app = build_router(ctx.clone());
        let user = sign_up(&app, "ana").await;
        let token = admin_token(&ctx, &app).await;
        let profile_id = user["profileId"].to_string();

        let response = send(
            &app,
            multipart_request(
                "/api/profile-update",
                &token,
                &[("id", profile_id.as_str()), ("phone", "+55 11 5555-1234")],
                true,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        let avatar = updated["profile"]["avatarUrl"].as_str().unwrap().to_string();
        assert_eq!(avatar, format!("avatars/{}.png", user["profileId"]));
        assert_eq!(updated["profile"]["phone"], "+55 11 5555-1234");

        let response = send(
            &app,
            Request::get(format!("/api/images/{}", avatar)).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            post_json("/api/profile-destroy", json!({"id": user["profileId"]}), Some(&token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["msg"], "ProfileDeleted");
    }

    #[tokio::test]
    async fn test_consent_flow() {
        let ctx = test_context().await;
        let app = build_router(ctx.clone());
        let token = admin_token(&ctx, &app).await;

        let response = send(
            &app,
            post_json(
                "/api/consent",
                json!({"email": "ana@x.com", "accepted_terms": true, "device_type": "desktop"}),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["consent"]["id"].as_i64().unwrap();

        let response = send(
            &app,
            post_json(
                "/api/consent-update",
                json!({"email": "ana@x.com", "stripe_customer_id": "cus_1"}),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            post_json("/api/consent-update", json!({"id": id, "plan": "pro"}), None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, get_with_token(&format!("/api/consent/{}", id), &token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["consent"]["plan"], "pro");

        let response = send(
            &app,
            post_json("/api/consent-destroy", json!({"id": id}), Some(&token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, get_with_token("/api/consents", &token)).await;
        assert_eq!(body_json(response).await["consents"], json!([]));
    }
}
