/// Account database models and operations
use crate::{db::map_unique_violation, error::ApiResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

/// Account record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub external_id: Option<String>,
    pub external_provider: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new account
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub name: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub external_id: Option<String>,
    pub external_provider: Option<String>,
}

const ACCOUNT_COLUMNS: &str =
    "id, name, email, password_hash, external_id, external_provider, created_at, updated_at";

/// Insert an account, translating unique violations into `Conflict`
pub async fn insert(conn: &mut SqliteConnection, new: &NewAccount) -> ApiResult<Account> {
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO account (name, email, password_hash, external_id, external_provider, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
    )
    .bind(&new.name)
    .bind(&new.email)
    .bind(&new.password_hash)
    .bind(&new.external_id)
    .bind(&new.external_provider)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(map_unique_violation)?;

    Ok(Account {
        id: result.last_insert_rowid(),
        name: new.name.clone(),
        email: new.email.clone(),
        password_hash: new.password_hash.clone(),
        external_id: new.external_id.clone(),
        external_provider: new.external_provider.clone(),
        created_at: now,
        updated_at: now,
    })
}

/// Get account by id
pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> ApiResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {} FROM account WHERE id = ?1",
        ACCOUNT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account)
}

/// Find account by email or name; an email match wins over a name match
pub async fn find_by_email_or_name(
    conn: &mut SqliteConnection,
    identifier: &str,
) -> ApiResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {} FROM account WHERE email = ?1 OR name = ?1
         ORDER BY CASE WHEN email = ?1 THEN 0 ELSE 1 END, id
         LIMIT 1",
        ACCOUNT_COLUMNS
    ))
    .bind(identifier)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account)
}

/// Find account by email
pub async fn find_by_email(conn: &mut SqliteConnection, email: &str) -> ApiResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {} FROM account WHERE email = ?1",
        ACCOUNT_COLUMNS
    ))
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account)
}

/// Find account linked to an external identity
pub async fn find_by_external(
    conn: &mut SqliteConnection,
    provider: &str,
    external_id: &str,
) -> ApiResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {} FROM account WHERE external_provider = ?1 AND external_id = ?2",
        ACCOUNT_COLUMNS
    ))
    .bind(provider)
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account)
}

/// Find the guest account keyed by a tenant domain
///
/// Only email-less, unlinked accounts qualify, so a regular account that
/// happens to carry a domain-like name is never picked up.
pub async fn find_guest_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> ApiResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {} FROM account WHERE name = ?1 AND email IS NULL AND external_id IS NULL",
        ACCOUNT_COLUMNS
    ))
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account)
}

/// Attach an external identity to an existing account and refresh its name
pub async fn link_external(
    conn: &mut SqliteConnection,
    account_id: i64,
    provider: &str,
    external_id: &str,
    name: &str,
) -> ApiResult<()> {
    sqlx::query(
        "UPDATE account SET external_provider = ?1, external_id = ?2, name = ?3, updated_at = ?4
         WHERE id = ?5",
    )
    .bind(provider)
    .bind(external_id)
    .bind(name)
    .bind(Utc::now())
    .bind(account_id)
    .execute(&mut *conn)
    .await
    .map_err(map_unique_violation)?;

    Ok(())
}
