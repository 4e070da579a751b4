/// OAuth identity providers
///
/// A provider turns an authorization code into a `ProviderProfile`; the
/// account side of the callback lives in the account manager.
use crate::{
    account::ProviderProfile,
    config::OAuthConfig,
    error::{ApiError, ApiResult},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider tag stored on linked accounts
    fn name(&self) -> &'static str;

    /// Where to send the browser; `state` round-trips to the callback
    fn authorize_url(&self, state: Option<&str>) -> String;

    /// Exchange an authorization code for the user's provider profile
    async fn exchange(&self, code: &str) -> ApiResult<ProviderProfile>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
}

/// Google OpenID Connect provider
pub struct GoogleProvider {
    client: reqwest::Client,
    config: OAuthConfig,
}

impl GoogleProvider {
    pub fn new(config: OAuthConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

/// Log a provider call failure and hide its detail from the caller
fn provider_failure(stage: &'static str) -> impl FnOnce(reqwest::Error) -> ApiError {
    move |e| {
        tracing::warn!(stage, error = %e, "OAuth provider call failed");
        ApiError::Authentication("Provider authentication failed".to_string())
    }
}

fn profile_from_userinfo(info: GoogleUserInfo) -> ApiResult<ProviderProfile> {
    let email = info
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::Validation("Provider did not return an email".to_string()))?;
    let display_name = info
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    Ok(ProviderProfile {
        external_id: info.sub,
        display_name,
        email,
        image: info.picture.filter(|p| !p.is_empty()),
    })
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorize_url(&self, state: Option<&str>) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}",
            self.config.authorize_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode("openid email profile"),
        );
        if let Some(state) = state {
            url.push_str("&state=");
            url.push_str(&urlencoding::encode(state));
        }
        url
    }

    async fn exchange(&self, code: &str) -> ApiResult<ProviderProfile> {
        let token: TokenResponse = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(provider_failure("code exchange"))?
            .json()
            .await
            .map_err(provider_failure("token response"))?;

        let info: GoogleUserInfo = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(provider_failure("userinfo request"))?
            .json()
            .await
            .map_err(provider_failure("userinfo response"))?;

        profile_from_userinfo(info)
    }
}
