/// Storefront tenant (store) queries
use crate::{db::map_unique_violation, error::ApiResult, roles::Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

/// Tenant record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: i64,
    pub name: String,
    pub domain: String,
    pub visits: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Register a tenant
pub async fn insert(conn: &mut SqliteConnection, name: &str, domain: &str) -> ApiResult<Store> {
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO store (name, domain, visits, created_at, updated_at) VALUES (?1, ?2, 0, ?3, ?3)",
    )
    .bind(name)
    .bind(domain)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(map_unique_violation)?;

    Ok(Store {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        domain: domain.to_string(),
        visits: 0,
        created_at: now,
        updated_at: now,
    })
}

/// Resolve a tenant from a request origin
///
/// A trailing slash on either side is ignored.
pub async fn find_by_domain(conn: &mut SqliteConnection, origin: &str) -> ApiResult<Option<Store>> {
    let origin = origin.trim_end_matches('/');
    if origin.is_empty() {
        return Ok(None);
    }

    let store = sqlx::query_as::<_, Store>(
        "SELECT id, name, domain, visits, created_at, updated_at FROM store
         WHERE RTRIM(domain, '/') = ?1",
    )
    .bind(origin)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(store)
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> ApiResult<Option<Store>> {
    let store = sqlx::query_as::<_, Store>(
        "SELECT id, name, domain, visits, created_at, updated_at FROM store WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(store)
}

pub async fn increment_visits(conn: &mut SqliteConnection, store_id: i64) -> ApiResult<()> {
    sqlx::query("UPDATE store SET visits = visits + 1, updated_at = ?1 WHERE id = ?2")
        .bind(Utc::now())
        .bind(store_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Attach an account to a tenant; a repeated call keeps the first role
pub async fn add_member(
    conn: &mut SqliteConnection,
    store_id: i64,
    account_id: i64,
    role: Role,
) -> ApiResult<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO store_member (store_id, account_id, role, created_at)
         VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(store_id)
    .bind(account_id)
    .bind(role.as_str())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
