/// Consent record storage
use crate::{db::map_unique_violation, error::ApiResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

/// Consent record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Consent {
    pub id: i64,
    pub email: Option<String>,
    pub accepted_terms: Option<bool>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub screen_resolution: Option<String>,
    pub platform: Option<String>,
    pub device_type: Option<String>,
    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub terms_version: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub plan: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable consent fields; `None` means "not supplied"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsentFields {
    pub email: Option<String>,
    pub accepted_terms: Option<bool>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub screen_resolution: Option<String>,
    pub platform: Option<String>,
    pub device_type: Option<String>,
    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub terms_version: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub plan: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// The single field a consent row is addressed by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentKey {
    Id(i64),
    Email(String),
    StripeCustomerId(String),
    StripeSubscriptionId(String),
}

impl ConsentKey {
    pub fn column(&self) -> &'static str {
        match self {
            ConsentKey::Id(_) => "id",
            ConsentKey::Email(_) => "email",
            ConsentKey::StripeCustomerId(_) => "stripe_customer_id",
            ConsentKey::StripeSubscriptionId(_) => "stripe_subscription_id",
        }
    }
}

const CONSENT_COLUMNS: &str = "id, email, accepted_terms, accepted_at, user_agent, language, timezone,
    screen_resolution, platform, device_type, page_url, referrer, terms_version,
    stripe_customer_id, stripe_subscription_id, plan, finalized_at, created_at, updated_at";

pub async fn insert(conn: &mut SqliteConnection, fields: &ConsentFields) -> ApiResult<Consent> {
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO consent (email, accepted_terms, accepted_at, user_agent, language, timezone,
            screen_resolution, platform, device_type, page_url, referrer, terms_version,
            stripe_customer_id, stripe_subscription_id, plan, finalized_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)",
    )
    .bind(&fields.email)
    .bind(fields.accepted_terms)
    .bind(fields.accepted_at)
    .bind(&fields.user_agent)
    .bind(&fields.language)
    .bind(&fields.timezone)
    .bind(&fields.screen_resolution)
    .bind(&fields.platform)
    .bind(&fields.device_type)
    .bind(&fields.page_url)
    .bind(&fields.referrer)
    .bind(&fields.terms_version)
    .bind(&fields.stripe_customer_id)
    .bind(&fields.stripe_subscription_id)
    .bind(&fields.plan)
    .bind(fields.finalized_at)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(map_unique_violation)?;

    Ok(Consent {
        id: result.last_insert_rowid(),
        email: fields.email.clone(),
        accepted_terms: fields.accepted_terms,
        accepted_at: fields.accepted_at,
        user_agent: fields.user_agent.clone(),
        language: fields.language.clone(),
        timezone: fields.timezone.clone(),
        screen_resolution: fields.screen_resolution.clone(),
        platform: fields.platform.clone(),
        device_type: fields.device_type.clone(),
        page_url: fields.page_url.clone(),
        referrer: fields.referrer.clone(),
        terms_version: fields.terms_version.clone(),
        stripe_customer_id: fields.stripe_customer_id.clone(),
        stripe_subscription_id: fields.stripe_subscription_id.clone(),
        plan: fields.plan.clone(),
        finalized_at: fields.finalized_at,
        created_at: now,
        updated_at: now,
    })
}

pub async fn find(conn: &mut SqliteConnection, key: &ConsentKey) -> ApiResult<Option<Consent>> {
    let sql = format!(
        "SELECT {} FROM consent WHERE {} = ?1",
        CONSENT_COLUMNS,
        key.column()
    );
    let query = sqlx::query_as::<_, Consent>(&sql);
    let query = match key {
        ConsentKey::Id(id) => query.bind(*id),
        ConsentKey::Email(v) | ConsentKey::StripeCustomerId(v) | ConsentKey::StripeSubscriptionId(v) => {
            query.bind(v.as_str())
        }
    };

    Ok(query.fetch_optional(&mut *conn).await?)
}

/// All consent records, newest first
pub async fn list(conn: &mut SqliteConnection) -> ApiResult<Vec<Consent>> {
    let consents = sqlx::query_as::<_, Consent>(&format!(
        "SELECT {} FROM consent ORDER BY id DESC",
        CONSENT_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(consents)
}

/// Apply supplied fields to the addressed row; `None` when no row matched
pub async fn update(
    conn: &mut SqliteConnection,
    key: &ConsentKey,
    fields: &ConsentFields,
) -> ApiResult<Option<Consent>> {
    // Resolve the id first; the update may rewrite the key column itself
    let Some(existing) = find(conn, key).await? else {
        return Ok(None);
    };

    sqlx::query(
        "UPDATE consent SET
            email = COALESCE(?1, email),
            accepted_terms = COALESCE(?2, accepted_terms),
            accepted_at = COALESCE(?3, accepted_at),
            user_agent = COALESCE(?4, user_agent),
            language = COALESCE(?5, language),
            timezone = COALESCE(?6, timezone),
            screen_resolution = COALESCE(?7, screen_resolution),
            platform = COALESCE(?8, platform),
            device_type = COALESCE(?9, device_type),
            page_url = COALESCE(?10, page_url),
            referrer = COALESCE(?11, referrer),
            terms_version = COALESCE(?12, terms_version),
            stripe_customer_id = COALESCE(?13, stripe_customer_id),
            stripe_subscription_id = COALESCE(?14, stripe_subscription_id),
            plan = COALESCE(?15, plan),
            finalized_at = COALESCE(?16, finalized_at),
            updated_at = ?17
         WHERE id = ?18",
    )
    .bind(&fields.email)
    .bind(fields.accepted_terms)
    .bind(fields.accepted_at)
    .bind(&fields.user_agent)
    .bind(&fields.language)
    .bind(&fields.timezone)
    .bind(&fields.screen_resolution)
    .bind(&fields.platform)
    .bind(&fields.device_type)
    .bind(&fields.page_url)
    .bind(&fields.referrer)
    .bind(&fields.terms_version)
    .bind(&fields.stripe_customer_id)
    .bind(&fields.stripe_subscription_id)
    .bind(&fields.plan)
    .bind(fields.finalized_at)
    .bind(Utc::now())
    .bind(existing.id)
    .execute(&mut *conn)
    .await
    .map_err(map_unique_violation)?;

    find(conn, &ConsentKey::Id(existing.id)).await
}

/// Delete the addressed row, returning the number of rows removed
pub async fn delete(conn: &mut SqliteConnection, key: &ConsentKey) -> ApiResult<u64> {
    let sql = format!("DELETE FROM consent WHERE {} = ?1", key.column());
    let query = sqlx::query(&sql);
    let query = match key {
        ConsentKey::Id(id) => query.bind(*id),
        ConsentKey::Email(v) | ConsentKey::StripeCustomerId(v) | ConsentKey::StripeSubscriptionId(v) => {
            query.bind(v.as_str())
        }
    };

    Ok(query.execute(&mut *conn).await?.rows_affected())
}
