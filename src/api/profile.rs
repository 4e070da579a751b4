/// Profile endpoints
///
/// Create and update take multipart forms whose optional `avatarUrl` part is
/// the image file.
use crate::{
    auth::RequestContext,
    context::AppContext,
    error::{ApiError, ApiResult},
    profile::{ImageUpload, ProfileForm, ProfileView},
    roles::Role,
};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

const AVATAR_FIELD: &str = "avatarUrl";

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/profile", post(create_profile))
        .route("/profile-update", post(update_profile))
        .route("/profile-destroy", post(destroy_profile))
        .route("/profile-by-user-id", post(profile_by_user_id))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Validation(format!("Malformed multipart body: {}", e))
}

fn parse_id(field: &str, value: &str) -> ApiResult<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::Validation(format!("{}: must be an integer", field)))
}

/// Split a multipart profile form into its fields and optional image
async fn read_profile_form(mut multipart: Multipart) -> ApiResult<(ProfileForm, Option<ImageUpload>)> {
    let mut form = ProfileForm::default();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == AVATAR_FIELD {
            let data = field.bytes().await.map_err(multipart_error)?;
            if !data.is_empty() {
                image = Some(ImageUpload { data: data.to_vec() });
            }
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "id" if !value.trim().is_empty() => form.id = Some(parse_id("id", &value)?),
            "userId" | "user_id" if !value.trim().is_empty() => {
                form.user_id = Some(parse_id("userId", &value)?)
            }
            "fullName" | "full_name" => form.full_name = Some(value),
            "phone" => form.phone = Some(value),
            "cpf" => form.cpf = Some(value),
            "role" => form.role = Some(value),
            _ => {}
        }
    }

    Ok((form.normalized(), image))
}

async fn create_profile(
    State(ctx): State<AppContext>,
    auth: RequestContext,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    auth.require_role(Role::ADMINS)?;

    let (form, image) = read_profile_form(multipart).await?;
    let account_id = form.user_id.unwrap_or(auth.account_id);
    let fields = form.into_fields()?;

    let profile = ctx.profiles.create(account_id, fields, image).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "profile": ProfileView::from(profile) })),
    ))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    auth: RequestContext,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    auth.require_role(Role::ADMINS)?;

    let (form, image) = read_profile_form(multipart).await?;
    let id = form
        .id
        .ok_or_else(|| ApiError::Validation("id: required".to_string()))?;
    let fields = form.into_fields()?;

    let profile = ctx.profiles.update(id, fields, image).await?;

    Ok(Json(json!({ "profile": ProfileView::from(profile) })))
}

#[derive(Debug, Deserialize)]
struct ProfileIdRequest {
    id: Option<i64>,
}

async fn destroy_profile(
    State(ctx): State<AppContext>,
    auth: RequestContext,
    Json(req): Json<ProfileIdRequest>,
) -> ApiResult<Json<Value>> {
    auth.require_role(Role::ADMINS)?;

    let id = req
        .id
        .ok_or_else(|| ApiError::Validation("id: required".to_string()))?;
    ctx.profiles.delete(id).await?;

    Ok(Json(json!({ "msg": "ProfileDeleted" })))
}

#[derive(Debug, Default, Deserialize)]
struct UserIdRequest {
    #[serde(alias = "userId")]
    user_id: Option<i64>,
}

async fn profile_by_user_id(
    State(ctx): State<AppContext>,
    auth: RequestContext,
    body: Option<Json<UserIdRequest>>,
) -> ApiResult<Json<Value>> {
    auth.require_role(Role::MEMBERS)?;

    let account_id = body
        .and_then(|Json(req)| req.user_id)
        .unwrap_or(auth.account_id);
    let profile = ctx.profiles.find_by_account_id(account_id).await?;

    Ok(Json(json!({ "profile": ProfileView::from(profile) })))
}
