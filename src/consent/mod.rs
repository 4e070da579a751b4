/// Consent records
///
/// Rows are created from a public consent banner and later addressed by
/// exactly one identifier: id, email or one of the billing ids.
use crate::{
    db::consent::{self, Consent, ConsentFields, ConsentKey},
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

const DEVICE_TYPES: &[&str] = &["desktop", "mobile", "tablet"];

/// Consent payload; on update it carries the identifier plus the changes
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ConsentPayload {
    pub id: Option<i64>,
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    pub accepted_terms: Option<bool>,
    pub accepted_at: Option<DateTime<Utc>>,
    #[validate(length(max = 1000))]
    pub user_agent: Option<String>,
    #[validate(length(max = 10))]
    pub language: Option<String>,
    #[validate(length(max = 50))]
    pub timezone: Option<String>,
    #[validate(length(max = 20))]
    pub screen_resolution: Option<String>,
    #[validate(length(max = 50))]
    pub platform: Option<String>,
    pub device_type: Option<String>,
    #[validate(url(message = "must be a URL"))]
    pub page_url: Option<String>,
    #[validate(url(message = "must be a URL"))]
    pub referrer: Option<String>,
    #[validate(length(max = 20))]
    pub terms_version: Option<String>,
    #[validate(length(max = 100))]
    pub stripe_customer_id: Option<String>,
    #[validate(length(max = 100))]
    pub stripe_subscription_id: Option<String>,
    #[validate(length(max = 50))]
    pub plan: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// Identifier-only payload used by lookup and destroy
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ConsentIdentifier {
    #[validate(range(min = 1))]
    pub id: Option<i64>,
    #[validate(length(max = 200))]
    pub email: Option<String>,
    #[validate(length(max = 200))]
    pub stripe_customer_id: Option<String>,
    #[validate(length(max = 200))]
    pub stripe_subscription_id: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Exactly one of the identifier fields, or a validation error
fn single_key(
    id: Option<i64>,
    email: Option<&str>,
    customer: Option<&str>,
    subscription: Option<&str>,
) -> ApiResult<ConsentKey> {
    let mut keys = Vec::with_capacity(1);
    if let Some(id) = id {
        keys.push(ConsentKey::Id(id));
    }
    if let Some(email) = email {
        keys.push(ConsentKey::Email(email.to_string()));
    }
    if let Some(customer) = customer {
        keys.push(ConsentKey::StripeCustomerId(customer.to_string()));
    }
    if let Some(subscription) = subscription {
        keys.push(ConsentKey::StripeSubscriptionId(subscription.to_string()));
    }

    match keys.len() {
        1 => Ok(keys.remove(0)),
        _ => Err(ApiError::Validation(
            "Exactly one identifier is required: id, email, stripe_customer_id or stripe_subscription_id"
                .to_string(),
        )),
    }
}

impl ConsentIdentifier {
    pub fn into_key(self) -> ApiResult<ConsentKey> {
        self.validate()?;
        single_key(
            self.id,
            blank_to_none(self.email).as_deref(),
            blank_to_none(self.stripe_customer_id).as_deref(),
            blank_to_none(self.stripe_subscription_id).as_deref(),
        )
    }
}

impl ConsentPayload {
    /// Drop empty strings so they behave as absent fields
    fn normalized(self) -> Self {
        Self {
            email: blank_to_none(self.email),
            user_agent: blank_to_none(self.user_agent),
            language: blank_to_none(self.language),
            timezone: blank_to_none(self.timezone),
            screen_resolution: blank_to_none(self.screen_resolution),
            platform: blank_to_none(self.platform),
            device_type: blank_to_none(self.device_type),
            page_url: blank_to_none(self.page_url),
            referrer: blank_to_none(self.referrer),
            terms_version: blank_to_none(self.terms_version),
            stripe_customer_id: blank_to_none(self.stripe_customer_id),
            stripe_subscription_id: blank_to_none(self.stripe_subscription_id),
            plan: blank_to_none(self.plan),
            ..self
        }
    }

    fn check(&self) -> ApiResult<()> {
        self.validate()?;
        if let Some(device) = &self.device_type {
            if !DEVICE_TYPES.contains(&device.as_str()) {
                return Err(ApiError::Validation(
                    "device_type: must be desktop, mobile or tablet".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn into_fields(self) -> ConsentFields {
        ConsentFields {
            email: self.email,
            accepted_terms: self.accepted_terms,
            accepted_at: self.accepted_at,
            user_agent: self.user_agent,
            language: self.language,
            timezone: self.timezone,
            screen_resolution: self.screen_resolution,
            platform: self.platform,
            device_type: self.device_type,
            page_url: self.page_url,
            referrer: self.referrer,
            terms_version: self.terms_version,
            stripe_customer_id: self.stripe_customer_id,
            stripe_subscription_id: self.stripe_subscription_id,
            plan: self.plan,
            finalized_at: self.finalized_at,
        }
    }

    /// Validated fields for a new record
    pub fn into_new_fields(self) -> ApiResult<ConsentFields> {
        let payload = self.normalized();
        payload.check()?;
        if payload.id.is_some() {
            return Err(ApiError::Validation("id: not allowed on create".to_string()));
        }
        Ok(payload.into_fields())
    }

    /// Split an update payload into the row selector and the changes
    pub fn into_update(self) -> ApiResult<(ConsentKey, ConsentFields)> {
        let payload = self.normalized();
        payload.check()?;

        let key = single_key(
            payload.id,
            payload.email.as_deref(),
            payload.stripe_customer_id.as_deref(),
            payload.stripe_subscription_id.as_deref(),
        )?;

        let mut fields = payload.into_fields();
        match key {
            ConsentKey::Id(_) => {}
            ConsentKey::Email(_) => fields.email = None,
            ConsentKey::StripeCustomerId(_) => fields.stripe_customer_id = None,
            ConsentKey::StripeSubscriptionId(_) => fields.stripe_subscription_id = None,
        }
        Ok((key, fields))
    }
}

/// Consent service
pub struct ConsentService {
    db: SqlitePool,
}

impl ConsentService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, payload: ConsentPayload) -> ApiResult<Consent> {
        let fields = payload.into_new_fields()?;

        let mut conn = self.db.acquire().await?;
        let created = consent::insert(&mut conn, &fields).await?;

        tracing::info!(consent_id = created.id, "Consent recorded");
        Ok(created)
    }

    pub async fn update(&self, payload: ConsentPayload) -> ApiResult<Consent> {
        let (key, fields) = payload.into_update()?;

        let mut conn = self.db.acquire().await?;
        let updated = consent::update(&mut conn, &key, &fields)
            .await?
            .ok_or_else(|| ApiError::NotFound("Consent not found".to_string()))?;

        tracing::info!(consent_id = updated.id, by = key.column(), "Consent updated");
        Ok(updated)
    }

    pub async fn find(&self, identifier: ConsentIdentifier) -> ApiResult<Consent> {
        let key = identifier.into_key()?;
        self.find_by_key(&key).await
    }

    pub async fn find_by_id(&self, id: i64) -> ApiResult<Consent> {
        self.find_by_key(&ConsentKey::Id(id)).await
    }

    async fn find_by_key(&self, key: &ConsentKey) -> ApiResult<Consent> {
        let mut conn = self.db.acquire().await?;
        consent::find(&mut conn, key)
            .await?
            .ok_or_else(|| ApiError::NotFound("Consent not found".to_string()))
    }

    pub async fn list(&self) -> ApiResult<Vec<Consent>> {
        let mut conn = self.db.acquire().await?;
        consent::list(&mut conn).await
    }

    pub async fn destroy(&self, identifier: ConsentIdentifier) -> ApiResult<()> {
        let key = identifier.into_key()?;

        let mut conn = self.db.acquire().await?;
        if consent::delete(&mut conn, &key).await? == 0 {
            return Err(ApiError::NotFound("Consent not found".to_string()));
        }

        tracing::info!(by = key.column(), "Consent deleted");
        Ok(())
    }
}
