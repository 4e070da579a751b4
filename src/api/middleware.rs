/// Session middleware and request helpers
use crate::{auth::RequestContext, context::AppContext, error::ApiError};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Authenticate a protected request and attach its `RequestContext`
///
/// Missing, unknown, revoked and expired tokens all yield 401.
pub async fn require_session(
    State(ctx): State<AppContext>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(req.headers())
        .ok_or_else(|| ApiError::Authentication("Missing authorization header".to_string()))?;

    let claims = ctx.account_manager.authenticate(&token).await.map_err(|e| {
        if let ApiError::Authentication(reason) = &e {
            tracing::warn!(path = %req.uri().path(), reason = %reason, "Rejected session token");
        }
        e
    })?;

    req.extensions_mut()
        .insert(RequestContext::new(claims.user, token));

    Ok(next.run(req).await)
}

/// Origin the request came from
///
/// Uses the `Origin` header, else `<scheme>://<host>` with the port dropped and
/// the scheme taken from `X-Forwarded-Proto`.
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    if let Some(origin) = headers
        .get(header::ORIGIN)
        .and_then(|h| h.to_str().ok())
        .filter(|o| !o.is_empty() && *o != "null")
    {
        return Some(origin.to_string());
    }

    let host = headers.get(header::HOST).and_then(|h| h.to_str().ok())?;
    let host = host.split(':').next().unwrap_or_default();
    if host.is_empty() {
        return None;
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .and_then(|p| p.split(',').next())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("http");

    Some(format!("{}://{}", scheme, host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(
            extract_bearer_token(&headers(&[("authorization", "Bearer abc")])).as_deref(),
            Some("abc")
        );
        assert_eq!(extract_bearer_token(&headers(&[("authorization", "Basic abc")])), None);
        assert_eq!(extract_bearer_token(&headers(&[("authorization", "Bearer ")])), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_origin_header_wins() {
        let map = headers(&[("origin", "https://shop.example"), ("host", "api.example")]);
        assert_eq!(request_origin(&map).as_deref(), Some("https://shop.example"));
    }

    #[test]
    fn test_origin_from_host() {
        let map = headers(&[("host", "shop.example:8443"), ("x-forwarded-proto", "https")]);
        assert_eq!(request_origin(&map).as_deref(), Some("https://shop.example"));

        let map = headers(&[("host", "shop.example")]);
        assert_eq!(request_origin(&map).as_deref(), Some("http://shop.example"));

        assert_eq!(request_origin(&HeaderMap::new()), None);
    }
}
