/// Request-scoped identity
///
/// The session middleware validates the bearer token once and stores a
/// `RequestContext` in the request extensions; handlers receive it as an
/// extractor and pass it on explicitly.
use crate::{account::IdentitySnapshot, error::ApiError, roles::Role};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated caller of a protected request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub account_id: i64,
    pub identity: IdentitySnapshot,
    /// Raw bearer token, needed for logout
    pub token: String,
}

impl RequestContext {
    pub fn new(identity: IdentitySnapshot, token: String) -> Self {
        Self {
            account_id: identity.id,
            identity,
            token,
        }
    }

    pub fn role(&self) -> Role {
        self.identity.profile.role
    }

    /// Allow-list check against the role carried by the session
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if self.role().is_any_of(allowed) {
            Ok(())
        } else {
            tracing::warn!(
                account_id = self.account_id,
                role = %self.role(),
                "Role not allowed for this route"
            );
            Err(ApiError::Authorization(format!(
                "Role {} may not perform this action",
                self.role()
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ApiError::Authentication("Missing authorization header".to_string()))
    }
}
