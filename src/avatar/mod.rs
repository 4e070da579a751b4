/// Avatar image storage and retrieval
///
/// Images live under `<public>/avatars/` and are referenced by their path
/// relative to the public directory (e.g. `avatars/12.png`).
use crate::{
    db::profile::DEFAULT_AVATAR,
    error::{ApiError, ApiResult},
};
use async_trait::async_trait;
use image::ImageFormat;
use std::{path::PathBuf, time::Duration};
use tokio::fs;

const AVATAR_FOLDER: &str = "avatars";

/// Disk store for avatar images
#[derive(Debug, Clone)]
pub struct AvatarStore {
    public_dir: PathBuf,
}

impl AvatarStore {
    pub fn new(public_dir: PathBuf) -> Self {
        Self { public_dir }
    }

    /// Absolute path of a stored reference, if it names a file inside the avatar folder
    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let file = relative.strip_prefix("avatars/")?;
        if file.is_empty() || file.contains('/') || file.contains('\\') || file.contains("..") {
            return None;
        }
        Some(self.public_dir.join(AVATAR_FOLDER).join(file))
    }

    /// Write `avatars/<profile id>.<ext>` and return its reference
    pub async fn save(&self, profile_id: i64, extension: &str, data: &[u8]) -> ApiResult<String> {
        let dir = self.public_dir.join(AVATAR_FOLDER);
        fs::create_dir_all(&dir).await?;

        let file_name = format!("{}.{}", profile_id, extension);
        fs::write(dir.join(&file_name), data).await?;

        Ok(format!("{}/{}", AVATAR_FOLDER, file_name))
    }

    /// Remove a stored avatar; the default image and missing files are left alone
    pub async fn delete(&self, relative: &str) -> ApiResult<()> {
        if relative == DEFAULT_AVATAR {
            return Ok(());
        }
        let Some(path) = self.resolve(relative) else {
            tracing::warn!(relative, "Refusing to delete avatar outside the avatar folder");
            return Ok(());
        };

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Io(e)),
        }
    }

    pub async fn exists(&self, relative: &str) -> bool {
        match self.resolve(relative) {
            Some(path) => fs::metadata(path).await.is_ok(),
            None => false,
        }
    }
}

/// File extension for image bytes, sniffed from their content
pub fn image_extension(data: &[u8]) -> Option<&'static str> {
    match image::guess_format(data).ok()? {
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Png => Some("png"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::WebP => Some("webp"),
        _ => None,
    }
}

/// Check an uploaded avatar: at most `max_bytes`, JPEG or PNG content
pub fn validate_upload(data: &[u8], max_bytes: usize) -> ApiResult<&'static str> {
    if data.is_empty() {
        return Err(ApiError::Validation("avatarUrl: empty file".to_string()));
    }
    if data.len() > max_bytes {
        return Err(ApiError::Validation(format!(
            "avatarUrl: file exceeds {} bytes",
            max_bytes
        )));
    }

    match image_extension(data) {
        Some(ext @ ("jpg" | "png")) => Ok(ext),
        _ => Err(ApiError::Validation(
            "avatarUrl: must be a JPEG or PNG image".to_string(),
        )),
    }
}

/// Downloads a remote image into the avatar store
///
/// Implementations never fail: any problem yields the default avatar.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_avatar(&self, url: &str, profile_id: i64) -> String;
}

/// HTTP image fetcher with a short timeout
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
    store: AvatarStore,
    max_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(store: AvatarStore, timeout: Duration, max_bytes: usize) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("storefront-auth/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            store,
            max_bytes,
        })
    }

    /// Fetch and store an image, reading at most `max_bytes` of body
    async fn download(&self, url: &str, profile_id: i64) -> ApiResult<String> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Downstream(format!("Image request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Downstream(format!(
                "Image request returned {}",
                response.status()
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(ApiError::Downstream(format!(
                    "Image is {} bytes, limit is {}",
                    length, self.max_bytes
                )));
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ApiError::Downstream(format!("Image body unreadable: {}", e)))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(ApiError::Downstream(format!(
                    "Image exceeds the {} byte limit",
                    self.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        let extension = image_extension(&bytes)
            .ok_or_else(|| ApiError::Downstream("Response is not a supported image".to_string()))?;

        self.store.save(profile_id, extension, &bytes).await
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_avatar(&self, url: &str, profile_id: i64) -> String {
        match self.download(url, profile_id).await {
            Ok(path) => {
                tracing::info!(profile_id, path = %path, "Stored remote avatar");
                path
            }
            Err(e) => {
                tracing::warn!(profile_id, url, error = %e, "Avatar download failed, using default");
                DEFAULT_AVATAR.to_string()
            }
        }
    }
}
