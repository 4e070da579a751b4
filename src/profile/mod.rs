/// Profile management
///
/// Profiles are created and edited by administrators, optionally with an
/// uploaded avatar. Uniqueness of phone and cpf is checked up front so the
/// caller gets the offending field back.
use crate::{
    avatar::{validate_upload, AvatarStore},
    db::{
        self, account,
        profile::{self, Profile, ProfileFields},
    },
    error::{ApiError, ApiResult},
    roles::Role,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use validator::Validate;

/// Editable profile fields as submitted by a client
///
/// Empty strings count as "not supplied".
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    pub id: Option<i64>,
    #[serde(alias = "user_id")]
    pub user_id: Option<i64>,
    #[validate(length(min = 2, max = 100, message = "must be 2 to 100 characters"))]
    pub full_name: Option<String>,
    #[validate(length(min = 7, max = 20, message = "must be 7 to 20 characters"))]
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub role: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ProfileForm {
    /// Drop empty strings so they behave as absent fields
    pub fn normalized(mut self) -> Self {
        self.full_name = non_empty(&self.full_name);
        self.phone = non_empty(&self.phone);
        self.cpf = non_empty(&self.cpf);
        self.role = non_empty(&self.role);
        self
    }

    /// Run field validation and convert into storable fields
    pub fn into_fields(self) -> ApiResult<ProfileFields> {
        self.validate()?;

        if let Some(phone) = &self.phone {
            let allowed = |c: char| c.is_ascii_digit() || " -+()".contains(c);
            if !phone.chars().all(allowed) {
                return Err(ApiError::Validation(
                    "phone: may only contain digits, spaces and - + ( )".to_string(),
                ));
            }
        }

        let role = self.role.as_deref().map(Role::parse).transpose()?;

        Ok(ProfileFields {
            full_name: self.full_name,
            role,
            phone: self.phone,
            cpf: self.cpf,
        })
    }
}

/// An uploaded avatar file
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
}

/// Profile as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: i64,
    pub user_id: i64,
    pub full_name: Option<String>,
    pub avatar_url: String,
    pub role: Role,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Profile> for ProfileView {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            user_id: p.account_id,
            full_name: p.full_name,
            avatar_url: p.avatar_url,
            role: p.role,
            phone: p.phone,
            cpf: p.cpf,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Profile service
pub struct ProfileService {
    db: SqlitePool,
    avatars: AvatarStore,
    max_upload_bytes: usize,
}

impl ProfileService {
    pub fn new(db: SqlitePool, avatars: AvatarStore, max_upload_bytes: usize) -> Self {
        Self {
            db,
            avatars,
            max_upload_bytes,
        }
    }

    async fn ensure_unique(&self, fields: &ProfileFields, exclude_id: Option<i64>) -> ApiResult<()> {
        let mut conn = self.db.acquire().await?;
        match profile::find_conflict(
            &mut conn,
            fields.phone.as_deref(),
            fields.cpf.as_deref(),
            exclude_id,
        )
        .await?
        {
            Some(field) => Err(ApiError::conflict(field)),
            None => Ok(()),
        }
    }

    /// Create the profile of `account_id`, storing the avatar if one was uploaded
    pub async fn create(
        &self,
        account_id: i64,
        fields: ProfileFields,
        image: Option<ImageUpload>,
    ) -> ApiResult<Profile> {
        let extension = image
            .as_ref()
            .map(|img| validate_upload(&img.data, self.max_upload_bytes))
            .transpose()?;
        self.ensure_unique(&fields, None).await?;

        let mut tx = db::begin_immediate(&self.db).await?;

        if account::find_by_id(&mut tx, account_id).await?.is_none() {
            return Err(ApiError::NotFound(format!("Account {} not found", account_id)));
        }

        let mut created = profile::insert(&mut tx, account_id, &fields)
            .await
            .map_err(|e| match e {
                ApiError::Conflict { field, .. } if field == "account_id" => {
                    ApiError::conflict("user_id")
                }
                other => other,
            })?;

        if let (Some(image), Some(extension)) = (image, extension) {
            let path = self.avatars.save(created.id, extension, &image.data).await?;
            profile::set_avatar(&mut tx, created.id, &path).await?;
            created.avatar_url = path;
        }

        tx.commit().await?;

        tracing::info!(profile_id = created.id, account_id, "Profile created");
        Ok(created)
    }

    /// Apply supplied fields; a new upload replaces the previous custom avatar
    pub async fn update(
        &self,
        id: i64,
        fields: ProfileFields,
        image: Option<ImageUpload>,
    ) -> ApiResult<Profile> {
        let extension = image
            .as_ref()
            .map(|img| validate_upload(&img.data, self.max_upload_bytes))
            .transpose()?;

        let existing = self.find_by_id(id).await?;
        self.ensure_unique(&fields, Some(id)).await?;

        let mut tx = db::begin_immediate(&self.db).await?;
        let mut updated = profile::update(&mut tx, id, &fields).await?;

        let mut replaced = None;
        if let (Some(image), Some(extension)) = (image, extension) {
            let path = self.avatars.save(id, extension, &image.data).await?;
            profile::set_avatar(&mut tx, id, &path).await?;
            if !existing.has_default_avatar() && existing.avatar_url != path {
                replaced = Some(existing.avatar_url.clone());
            }
            updated.avatar_url = path;
        }

        tx.commit().await?;

        if let Some(old) = replaced {
            if let Err(e) = self.avatars.delete(&old).await {
                tracing::warn!(profile_id = id, error = %e, "Failed to remove replaced avatar");
            }
        }

        tracing::info!(profile_id = id, "Profile updated");
        Ok(updated)
    }

    /// Delete a profile and its custom avatar
    pub async fn delete(&self, id: i64) -> ApiResult<()> {
        let existing = self.find_by_id(id).await?;

        let mut conn = self.db.acquire().await?;
        profile::delete(&mut conn, id).await?;
        drop(conn);

        if let Err(e) = self.avatars.delete(&existing.avatar_url).await {
            tracing::warn!(profile_id = id, error = %e, "Failed to remove avatar of deleted profile");
        }

        tracing::info!(profile_id = id, "Profile deleted");
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> ApiResult<Profile> {
        let mut conn = self.db.acquire().await?;
        profile::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))
    }

    pub async fn find_by_account_id(&self, account_id: i64) -> ApiResult<Profile> {
        let mut conn = self.db.acquire().await?;
        profile::find_by_account_id(&mut conn, account_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))
    }
}
