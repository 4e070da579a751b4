/// Identity resolution
///
/// Reconciles password accounts, OAuth external identities and tenant guest
/// accounts into one account + profile pair. Every method runs on the caller's
/// connection so a whole flow shares one transaction.
use crate::{
    account::{
        password::{guest_password, CredentialVerifier},
        AccountWithProfile, ProviderProfile,
    },
    db::{
        account::{self, Account, NewAccount},
        profile::{self, ProfileFields},
        tenant::Store,
    },
    error::{ApiError, ApiResult},
    roles::Role,
};
use sqlx::SqliteConnection;

/// Full name given to guest profiles of a tenant without a name
const GUEST_FULL_NAME: &str = "Invitado";

/// Result of resolving an OAuth provider profile
#[derive(Debug, Clone)]
pub struct ExternalResolution {
    pub identity: AccountWithProfile,
    /// Provider image to download once the transaction has committed
    pub avatar_source: Option<String>,
}

/// Identity resolver
#[derive(Clone)]
pub struct IdentityResolver {
    verifier: CredentialVerifier,
}

impl IdentityResolver {
    pub fn new(verifier: CredentialVerifier) -> Self {
        Self { verifier }
    }

    /// Load an account and its profile
    pub async fn load_with_profile(
        conn: &mut SqliteConnection,
        account_id: i64,
    ) -> ApiResult<Option<AccountWithProfile>> {
        let Some(account) = account::find_by_id(conn, account_id).await? else {
            return Ok(None);
        };

        let profile = profile::find_by_account_id(conn, account_id).await?;
        Ok(profile.map(|profile| AccountWithProfile { account, profile }))
    }

    /// Attach a profile to `account`, creating one with `fields` if it has none
    pub async fn ensure_profile(
        conn: &mut SqliteConnection,
        account: Account,
        fields: &ProfileFields,
    ) -> ApiResult<AccountWithProfile> {
        let profile = match profile::find_by_account_id(conn, account.id).await? {
            Some(existing) => existing,
            None => {
                tracing::debug!(account_id = account.id, "Creating missing profile");
                profile::insert(conn, account.id, fields).await?
            }
        };

        Ok(AccountWithProfile { account, profile })
    }

    /// Find or create the guest account of a tenant
    ///
    /// The guest account is keyed by the tenant domain and carries a password
    /// derived from it. A stored hash that does not match the derived password
    /// is an integrity violation, not a user error.
    pub async fn resolve_guest(
        &self,
        conn: &mut SqliteConnection,
        store: &Store,
    ) -> ApiResult<AccountWithProfile> {
        let domain = store.domain.as_str();
        let derived = guest_password(domain);
        let guest_profile = ProfileFields {
            full_name: Some(if store.name.trim().is_empty() {
                GUEST_FULL_NAME.to_string()
            } else {
                store.name.clone()
            }),
            role: Some(Role::Invitado),
            ..Default::default()
        };

        let account = match account::find_guest_by_name(conn, domain).await? {
            Some(existing) => {
                if !self.verifier.verify(&derived, existing.password_hash.as_deref()) {
                    return Err(ApiError::Integrity(format!(
                        "Guest credentials for {} do not match the derived password",
                        domain
                    )));
                }
                tracing::debug!(domain, account_id = existing.id, "Existing guest account");
                existing
            }
            None => {
                tracing::info!(domain, "Creating guest account");
                let new = NewAccount {
                    name: domain.to_string(),
                    password_hash: Some(self.verifier.hash(&derived)?),
                    ..Default::default()
                };

                // Callers hold an immediate transaction, so a concurrent first
                // sign-in waits and then finds this row. A writer outside one
                // still hits the unique guest-name index: a retryable conflict.
                account::insert(conn, &new).await.map_err(|e| match e {
                    ApiError::Conflict { .. } => ApiError::Conflict {
                        field: "domain".to_string(),
                        message: "Guest account is being created, retry".to_string(),
                    },
                    other => other,
                })?
            }
        };

        let account_id = account.id;
        Self::ensure_profile(conn, account, &guest_profile).await?;

        Self::load_with_profile(conn, account_id)
            .await?
            .ok_or_else(|| ApiError::Internal("Guest account has no profile".to_string()))
    }

    /// Find, link or create the account for an OAuth provider profile
    ///
    /// An (external id, provider) match wins over an email match. An email
    /// match gains the external identity and keeps its profile.
    pub async fn resolve_external(
        &self,
        conn: &mut SqliteConnection,
        provider: &str,
        external: &ProviderProfile,
    ) -> ApiResult<ExternalResolution> {
        let new_profile = ProfileFields {
            full_name: Some(external.display_name.clone()),
            role: Some(Role::User),
            ..Default::default()
        };

        let account = match account::find_by_external(conn, provider, &external.external_id).await? {
            Some(linked) => {
                tracing::debug!(account_id = linked.id, provider, "External identity already linked");
                linked
            }
            None => match account::find_by_email(conn, &external.email).await? {
                Some(existing) => {
                    tracing::info!(account_id = existing.id, provider, "Linking external identity to account");
                    account::link_external(
                        conn,
                        existing.id,
                        provider,
                        &external.external_id,
                        &external.display_name,
                    )
                    .await?;
                    account::find_by_id(conn, existing.id)
                        .await?
                        .ok_or_else(|| ApiError::Internal("Linked account vanished".to_string()))?
                }
                None => {
                    let name = external
                        .email
                        .split('@')
                        .next()
                        .filter(|local| !local.is_empty())
                        .unwrap_or(external.email.as_str())
                        .to_string();
                    tracing::info!(provider, "Creating account from external identity");
                    account::insert(
                        conn,
                        &NewAccount {
                            name,
                            email: Some(external.email.clone()),
                            external_id: Some(external.external_id.clone()),
                            external_provider: Some(provider.to_string()),
                            ..Default::default()
                        },
                    )
                    .await?
                }
            },
        };

        let identity = Self::ensure_profile(conn, account, &new_profile).await?;

        // Never overwrite an avatar the user customized
        let avatar_source = external
            .image
            .clone()
            .filter(|_| identity.profile.has_default_avatar());

        Ok(ExternalResolution {
            identity,
            avatar_source,
        })
    }
}
