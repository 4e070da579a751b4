/// Session token issuing and decoding (HS256 JWT)
use crate::{
    account::IdentitySnapshot,
    config::AuthConfig,
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user: IdentitySnapshot,
    pub iat: i64,
    pub exp: i64,
    /// Keeps tokens issued within the same second distinct
    pub jti: Uuid,
}

impl Claims {
    /// Absolute expiry encoded in the token
    pub fn expires_at(&self) -> ApiResult<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .ok_or_else(|| ApiError::Jwt(format!("Invalid exp claim: {}", self.exp)))
    }
}

/// A freshly signed token and the expiry persisted next to it
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token issuer
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: Duration::seconds(config.token_ttl),
        }
    }

    /// Sign a token for an identity snapshot, expiring after the configured TTL
    pub fn issue(&self, user: &IdentitySnapshot) -> ApiResult<IssuedToken> {
        let now = Utc::now();
        let claims = Claims {
            user: user.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Jwt(format!("Failed to generate token: {}", e)))?;
        let expires_at = claims.expires_at()?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify the signature and decode the claims
    ///
    /// An expired token is an authentication failure. Any other failure on a
    /// token that the store already accepted means the signing key does not
    /// match what issued it, and surfaces as an integrity violation.
    pub fn decode(&self, token: &str) -> ApiResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => {
                    ApiError::Authentication("Token expired".to_string())
                }
                _ => ApiError::Integrity(format!("Stored session token failed verification: {}", e)),
            })
    }
}
