/// Profile database models and operations
use crate::{
    db::map_unique_violation,
    error::{ApiError, ApiResult},
    roles::Role,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

/// Avatar reference meaning "no custom avatar set"
pub const DEFAULT_AVATAR: &str = "avatars/default.jpg";

/// Profile record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub account_id: i64,
    pub full_name: Option<String>,
    pub avatar_url: String,
    pub role: Role,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn has_default_avatar(&self) -> bool {
        self.avatar_url == DEFAULT_AVATAR
    }
}

/// Writable profile fields
///
/// On insert every `None` falls back to the column default; on update a `None`
/// leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
}

const PROFILE_COLUMNS: &str =
    "id, account_id, full_name, avatar_url, role, phone, cpf, created_at, updated_at";

fn row_to_profile(row: &SqliteRow) -> ApiResult<Profile> {
    let role: String = row.get("role");
    let role = Role::parse(&role)
        .map_err(|_| ApiError::Integrity(format!("Unknown role stored on profile: {}", role)))?;

    Ok(Profile {
        id: row.get("id"),
        account_id: row.get("account_id"),
        full_name: row.get("full_name"),
        avatar_url: row.get("avatar_url"),
        role,
        phone: row.get("phone"),
        cpf: row.get("cpf"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Insert a profile for an account
pub async fn insert(
    conn: &mut SqliteConnection,
    account_id: i64,
    fields: &ProfileFields,
) -> ApiResult<Profile> {
    let now = Utc::now();
    let role = fields.role.unwrap_or_default();

    let result = sqlx::query(
        "INSERT INTO profile (account_id, full_name, avatar_url, role, phone, cpf, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
    )
    .bind(account_id)
    .bind(&fields.full_name)
    .bind(DEFAULT_AVATAR)
    .bind(role.as_str())
    .bind(&fields.phone)
    .bind(&fields.cpf)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(map_unique_violation)?;

    Ok(Profile {
        id: result.last_insert_rowid(),
        account_id,
        full_name: fields.full_name.clone(),
        avatar_url: DEFAULT_AVATAR.to_string(),
        role,
        phone: fields.phone.clone(),
        cpf: fields.cpf.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> ApiResult<Option<Profile>> {
    let row = sqlx::query(&format!("SELECT {} FROM profile WHERE id = ?1", PROFILE_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_profile).transpose()
}

pub async fn find_by_account_id(
    conn: &mut SqliteConnection,
    account_id: i64,
) -> ApiResult<Option<Profile>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM profile WHERE account_id = ?1",
        PROFILE_COLUMNS
    ))
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_profile).transpose()
}

/// Apply the supplied fields and return the stored row
pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    fields: &ProfileFields,
) -> ApiResult<Profile> {
    let result = sqlx::query(
        "UPDATE profile SET
            full_name = COALESCE(?1, full_name),
            role = COALESCE(?2, role),
            phone = COALESCE(?3, phone),
            cpf = COALESCE(?4, cpf),
            updated_at = ?5
         WHERE id = ?6",
    )
    .bind(&fields.full_name)
    .bind(fields.role.map(|r| r.as_str()))
    .bind(&fields.phone)
    .bind(&fields.cpf)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(map_unique_violation)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Profile not found".to_string()));
    }

    find_by_id(conn, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))
}

pub async fn set_avatar(conn: &mut SqliteConnection, id: i64, avatar_url: &str) -> ApiResult<()> {
    sqlx::query("UPDATE profile SET avatar_url = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(avatar_url)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Delete a profile, returning the number of rows removed
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> ApiResult<u64> {
    let result = sqlx::query("DELETE FROM profile WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Name of the first unique field (`phone`, then `cpf`) already held by another profile
pub async fn find_conflict(
    conn: &mut SqliteConnection,
    phone: Option<&str>,
    cpf: Option<&str>,
    exclude_id: Option<i64>,
) -> ApiResult<Option<&'static str>> {
    let exclude = exclude_id.unwrap_or(-1);

    for (field, value) in [("phone", phone), ("cpf", cpf)] {
        let Some(value) = value else { continue };

        let taken: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM profile WHERE {} = ?1 AND id != ?2 LIMIT 1",
            field
        ))
        .bind(value)
        .bind(exclude)
        .fetch_optional(&mut *conn)
        .await?;

        if taken.is_some() {
            return Ok(Some(field));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::account::{self, NewAccount},
        test_support::test_pool,
    };

    async fn account(conn: &mut SqliteConnection, name: &str) -> i64 {
        account::insert(
            conn,
            &NewAccount {
                name: name.to_string(),
                email: Some(format!("{}@x.com", name)),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_insert_uses_defaults() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let account_id = account(&mut conn, "ana").await;

        let profile = insert(&mut conn, account_id, &ProfileFields::default())
            .await
            .unwrap();
        assert!(profile.has_default_avatar());
        assert_eq!(profile.role, Role::User);

        let stored = find_by_account_id(&mut conn, account_id).await.unwrap().unwrap();
        assert_eq!(stored.id, profile.id);
        assert_eq!(stored.avatar_url, DEFAULT_AVATAR);
    }

    #[tokio::test]
    async fn test_update_only_touches_supplied_fields() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let account_id = account(&mut conn, "ana").await;

        let profile = insert(
            &mut conn,
            account_id,
            &ProfileFields {
                full_name: Some("Ana Lopez".to_string()),
                phone: Some("555-1234".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let updated = update(
            &mut conn,
            profile.id,
            &ProfileFields {
                role: Some(Role::Seller),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.role, Role::Seller);
        assert_eq!(updated.full_name.as_deref(), Some("Ana Lopez"));
        assert_eq!(updated.phone.as_deref(), Some("555-1234"));
    }

    #[tokio::test]
    async fn test_find_conflict_excludes_self() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let ana = account(&mut conn, "ana").await;
        let bob = account(&mut conn, "bob").await;

        let profile = insert(
            &mut conn,
            ana,
            &ProfileFields {
                cpf: Some("12345678900".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        insert(&mut conn, bob, &ProfileFields::default()).await.unwrap();

        let other = find_conflict(&mut conn, None, Some("12345678900"), None).await.unwrap();
        assert_eq!(other, Some("cpf"));

        let own = find_conflict(&mut conn, None, Some("12345678900"), Some(profile.id))
            .await
            .unwrap();
        assert_eq!(own, None);
    }

    #[tokio::test]
    async fn test_duplicate_phone_is_conflict() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let ana = account(&mut conn, "ana").await;
        let bob = account(&mut conn, "bob").await;

        let fields = ProfileFields {
            phone: Some("555-1234".to_string()),
            ..Default::default()
        };
        insert(&mut conn, ana, &fields).await.unwrap();

        match insert(&mut conn, bob, &fields).await {
            Err(ApiError::Conflict { field, .. }) => assert_eq!(field, "phone"),
            other => panic!("Expected Conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_profile_removed_with_account() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let account_id = account(&mut conn, "ana").await;
        insert(&mut conn, account_id, &ProfileFields::default()).await.unwrap();

        sqlx::query("DELETE FROM account WHERE id = ?1")
            .bind(account_id)
            .execute(&mut *conn)
            .await
            .unwrap();

        assert!(find_by_account_id(&mut conn, account_id).await.unwrap().is_none());
    }
}
