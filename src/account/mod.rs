/// Account and session management
///
/// Handles credential verification, token issuing, the revocable token store,
/// identity resolution across password, OAuth and tenant-guest accounts, and
/// the sign-in/sign-up flows composed from them.

mod manager;
pub mod password;
pub mod resolver;
pub mod store;
pub mod token;

pub use manager::AccountManager;
pub use password::CredentialVerifier;
pub use resolver::IdentityResolver;
pub use store::{SessionToken, TokenStore};
pub use token::{Claims, IssuedToken, TokenIssuer};

use crate::{
    db::{
        account::Account,
        catalog::{Category, Product},
        profile::Profile,
        tenant::Store,
    },
    roles::Role,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Profile projection embedded in a session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub id: i64,
    pub full_name: Option<String>,
    pub avatar_url: String,
    pub role: Role,
}

/// Identity projection embedded in a session token
///
/// Only the stable fields needed downstream; never the full account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub id: i64,
    pub email: Option<String>,
    pub name: String,
    pub profile: ProfileSnapshot,
}

impl IdentitySnapshot {
    pub fn new(account: &Account, profile: &Profile) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            name: account.name.clone(),
            profile: ProfileSnapshot {
                id: profile.id,
                full_name: profile.full_name.clone(),
                avatar_url: profile.avatar_url.clone(),
                role: profile.role,
            },
        }
    }
}

/// An account with its one profile attached
#[derive(Debug, Clone)]
pub struct AccountWithProfile {
    pub account: Account,
    pub profile: Profile,
}

impl AccountWithProfile {
    pub fn snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot::new(&self.account, &self.profile)
    }
}

/// Sign-up request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 5, message = "must be at least 5 characters"))]
    pub password: String,
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    pub full_name: Option<String>,
    pub role: Option<String>,
}

/// Sign-in request; `email` accepts an email or an account name
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    pub email: String,
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    pub password: String,
}

/// Session response for sign-in, sign-up and OAuth callback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: i64,
    pub user_name: String,
    pub email: Option<String>,
    pub token: String,
    #[serde(rename = "store_id", skip_serializing_if = "Option::is_none")]
    pub store_id: Option<i64>,
    pub profile_id: i64,
    pub full_name: Option<String>,
    pub role: Role,
    pub avatar_url: String,
}

impl SessionResponse {
    pub fn new(user: &IdentitySnapshot, token: String, store_id: Option<i64>) -> Self {
        Self {
            id: user.id,
            user_name: user.name.clone(),
            email: user.email.clone(),
            token,
            store_id,
            profile_id: user.profile.id,
            full_name: user.profile.full_name.clone(),
            role: user.profile.role,
            avatar_url: user.profile.avatar_url.clone(),
        }
    }
}

/// Domain guest sign-in response with best-effort storefront enrichment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSessionResponse {
    pub id: i64,
    pub token: String,
    pub role: Role,
    #[serde(rename = "store_id")]
    pub store_id: i64,
    pub stores: Store,
    pub categories: Option<Vec<Category>>,
    pub products: Option<Vec<Product>>,
    pub has_more: Option<bool>,
    pub next_cursor: Option<i64>,
}

/// Provider profile delivered to the OAuth callback flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub external_id: String,
    pub display_name: String,
    pub email: String,
    pub image: Option<String>,
}
