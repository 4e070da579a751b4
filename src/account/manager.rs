/// Account manager
///
/// Composes the credential verifier, token issuer, token store and identity
/// resolver into the sign-in, sign-up, domain guest and OAuth flows. Each flow
/// that writes runs in one transaction covering account, profile and token
/// rows; enrichment and avatar downloads happen only after commit.
use crate::{
    account::{
        resolver::IdentityResolver, AccountWithProfile, Claims, CredentialVerifier,
        DomainSessionResponse, IdentitySnapshot, IssuedToken, ProviderProfile, SessionResponse,
        SignInRequest, SignUpRequest, TokenIssuer, TokenStore,
    },
    avatar::ImageFetcher,
    config::ServerConfig,
    db::{
        self,
        account::{self, NewAccount},
        catalog,
        profile::{self, ProfileFields, DEFAULT_AVATAR},
        tenant::{self, Store},
    },
    error::{ApiError, ApiResult},
    roles::Role,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Products returned with a domain guest session
const STOREFRONT_PAGE_SIZE: u32 = 15;

/// Outcome of the OAuth callback flow
#[derive(Debug, Clone)]
pub struct OAuthOutcome {
    pub session: SessionResponse,
    /// Tenant named by the callback state, if any
    pub store: Option<Store>,
}

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    verifier: CredentialVerifier,
    issuer: TokenIssuer,
    tokens: TokenStore,
    resolver: IdentityResolver,
    images: Arc<dyn ImageFetcher>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(
        db: SqlitePool,
        config: &ServerConfig,
        images: Arc<dyn ImageFetcher>,
    ) -> ApiResult<Self> {
        let verifier = CredentialVerifier::new(&config.authentication)?;

        Ok(Self {
            tokens: TokenStore::new(db.clone()),
            issuer: TokenIssuer::new(&config.authentication),
            resolver: IdentityResolver::new(verifier.clone()),
            verifier,
            images,
            db,
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Sign and persist a token for an identity inside the caller's transaction
    async fn issue_session(
        &self,
        conn: &mut SqliteConnection,
        identity: &AccountWithProfile,
    ) -> ApiResult<(IssuedToken, IdentitySnapshot)> {
        let snapshot = identity.snapshot();
        let issued = self.issuer.issue(&snapshot)?;
        TokenStore::create(conn, identity.account.id, &issued.token, Some(issued.expires_at)).await?;

        Ok((issued, snapshot))
    }

    /// Authenticate with an email (or account name) and password
    ///
    /// An unknown identifier is reported as not found, separately from a
    /// wrong password. Lookup and verification run before the write lock is
    /// taken.
    pub async fn sign_in(&self, request: &SignInRequest) -> ApiResult<SessionResponse> {
        let found = {
            let mut conn = self.db.acquire().await?;
            account::find_by_email_or_name(&mut conn, &request.email).await?
        };
        let Some(found) = found else {
            tracing::debug!("Sign-in for unknown account");
            return Err(ApiError::NotFound("Account not found".to_string()));
        };

        if !self.verifier.verify(&request.password, found.password_hash.as_deref()) {
            tracing::warn!(account_id = found.id, "Sign-in with invalid credentials");
            return Err(ApiError::InvalidCredentials);
        }

        let mut tx = db::begin_immediate(&self.db).await?;
        let identity = IdentityResolver::ensure_profile(&mut tx, found, &ProfileFields::default()).await?;
        let (issued, snapshot) = self.issue_session(&mut tx, &identity).await?;
        tx.commit().await?;

        tracing::info!(account_id = snapshot.id, "Signed in");
        Ok(SessionResponse::new(&snapshot, issued.token, None))
    }

    /// Register a password account with its profile
    ///
    /// When `origin` resolves to a tenant the account also becomes a member of
    /// it. Everything is rolled back if any step fails.
    pub async fn sign_up(
        &self,
        request: &SignUpRequest,
        origin: Option<&str>,
    ) -> ApiResult<SessionResponse> {
        let role = match request.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(raw) => Role::parse(raw)?,
            None => Role::User,
        };
        if !role.is_any_of(Role::SELF_ASSIGNABLE) {
            return Err(ApiError::Validation(format!(
                "role: {} cannot be chosen at sign-up",
                role
            )));
        }

        let name = match request.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => request
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        let password_hash = self.verifier.hash(&request.password)?;

        let mut tx = db::begin_immediate(&self.db).await?;

        let created = account::insert(
            &mut tx,
            &NewAccount {
                name,
                email: Some(request.email.clone()),
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;
        let profile = profile::insert(
            &mut tx,
            created.id,
            &ProfileFields {
                full_name: request.full_name.clone(),
                role: Some(role),
                ..Default::default()
            },
        )
        .await?;

        let store = match origin {
            Some(origin) => tenant::find_by_domain(&mut tx, origin).await?,
            None => None,
        };
        if let Some(store) = &store {
            tenant::add_member(&mut tx, store.id, created.id, role).await?;
        }

        let identity = AccountWithProfile {
            account: created,
            profile,
        };
        let (issued, snapshot) = self.issue_session(&mut tx, &identity).await?;
        tx.commit().await?;

        tracing::info!(account_id = snapshot.id, store_id = ?store.as_ref().map(|s| s.id), "Account registered");
        Ok(SessionResponse::new(
            &snapshot,
            issued.token,
            store.map(|s| s.id),
        ))
    }

    /// Guest sign-in for the tenant that owns `origin`
    pub async fn sign_in_domain(&self, origin: &str) -> ApiResult<DomainSessionResponse> {
        let mut tx = db::begin_immediate(&self.db).await?;

        let Some(store) = tenant::find_by_domain(&mut tx, origin).await? else {
            tracing::warn!(origin, "Guest sign-in from unknown domain");
            return Err(ApiError::UnauthorizedDomain(origin.to_string()));
        };

        let identity = self.resolver.resolve_guest(&mut tx, &store).await?;
        let (issued, snapshot) = self.issue_session(&mut tx, &identity).await?;
        tx.commit().await?;

        tracing::info!(store_id = store.id, account_id = snapshot.id, "Guest signed in");

        let enrichment = self.storefront_snapshot(&store).await;
        Ok(DomainSessionResponse {
            id: snapshot.id,
            token: issued.token,
            role: snapshot.profile.role,
            store_id: store.id,
            stores: enrichment.store,
            categories: enrichment.categories,
            products: enrichment.products.as_ref().map(|p| p.items.clone()),
            has_more: enrichment.products.as_ref().map(|p| p.has_more),
            next_cursor: enrichment.products.and_then(|p| p.next_cursor),
        })
    }

    /// Post-commit visit counter and first catalog page; failures only log
    async fn storefront_snapshot(&self, store: &Store) -> StorefrontSnapshot {
        let mut snapshot = StorefrontSnapshot {
            store: store.clone(),
            categories: None,
            products: None,
        };

        let mut conn = match self.db.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(store_id = store.id, error = %e, "Storefront enrichment skipped");
                return snapshot;
            }
        };

        match tenant::increment_visits(&mut conn, store.id).await {
            Ok(()) => snapshot.store.visits += 1,
            Err(e) => tracing::warn!(store_id = store.id, error = %e, "Failed to count visit"),
        }

        match catalog::products_page(&mut conn, store.id, STOREFRONT_PAGE_SIZE, None).await {
            Ok(page) => snapshot.products = Some(page),
            Err(e) => tracing::warn!(store_id = store.id, error = %e, "Failed to load products"),
        }

        match catalog::categories(&mut conn, store.id).await {
            Ok(categories) => snapshot.categories = Some(categories),
            Err(e) => tracing::warn!(store_id = store.id, error = %e, "Failed to load categories"),
        }

        snapshot
    }

    /// Sign in with a provider profile, linking or creating the local account
    ///
    /// A provider image replaces only the default avatar, and is downloaded
    /// after commit; a failed download never fails the login.
    pub async fn oauth_sign_in(
        &self,
        provider: &str,
        external: &ProviderProfile,
        store_id: Option<i64>,
    ) -> ApiResult<OAuthOutcome> {
        let mut tx = db::begin_immediate(&self.db).await?;

        let store = match store_id {
            Some(id) => Some(
                tenant::find_by_id(&mut tx, id)
                    .await?
                    .ok_or_else(|| ApiError::Validation(format!("Store {} does not exist", id)))?,
            ),
            None => None,
        };

        let resolution = self.resolver.resolve_external(&mut tx, provider, external).await?;
        if let Some(store) = &store {
            tenant::add_member(
                &mut tx,
                store.id,
                resolution.identity.account.id,
                resolution.identity.profile.role,
            )
            .await?;
        }

        let (issued, mut snapshot) = self.issue_session(&mut tx, &resolution.identity).await?;
        tx.commit().await?;

        if let Some(source) = resolution.avatar_source {
            let profile_id = snapshot.profile.id;
            let stored = self.images.fetch_avatar(&source, profile_id).await;
            if stored != DEFAULT_AVATAR {
                match self.set_avatar(profile_id, &stored).await {
                    Ok(()) => snapshot.profile.avatar_url = stored,
                    Err(e) => tracing::warn!(profile_id, error = %e, "Failed to record provider avatar"),
                }
            }
        }

        tracing::info!(account_id = snapshot.id, provider, "Signed in with provider");
        Ok(OAuthOutcome {
            session: SessionResponse::new(&snapshot, issued.token, store.as_ref().map(|s| s.id)),
            store,
        })
    }

    async fn set_avatar(&self, profile_id: i64, path: &str) -> ApiResult<()> {
        let mut conn = self.db.acquire().await?;
        profile::set_avatar(&mut conn, profile_id, path).await
    }

    /// Validate a bearer token against the store, then its signature
    ///
    /// Unknown, revoked and expired tokens are reported identically.
    pub async fn authenticate(&self, token: &str) -> ApiResult<Claims> {
        let Some(row) = self.tokens.find_valid_by_token(token).await? else {
            return Err(ApiError::Authentication(
                "Invalid, revoked or expired token".to_string(),
            ));
        };

        let claims = self.issuer.decode(token)?;
        if claims.user.id != row.account_id {
            return Err(ApiError::Integrity(format!(
                "Token row for account {} carries claims for account {}",
                row.account_id, claims.user.id
            )));
        }

        Ok(claims)
    }

    /// Revoke one session token
    pub async fn logout(&self, token: &str) -> ApiResult<()> {
        match self.tokens.revoke_by_token(token).await? {
            0 => Err(ApiError::NotFound("Token already revoked or not found".to_string())),
            _ => Ok(()),
        }
    }

    /// Revoke every session of an account
    pub async fn logout_all(&self, account_id: i64) -> ApiResult<u64> {
        self.tokens.revoke_all_for_account(account_id).await
    }
}

struct StorefrontSnapshot {
    store: Store,
    categories: Option<Vec<catalog::Category>>,
    products: Option<catalog::ProductPage>,
}
