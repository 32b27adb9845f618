use std::path::PathBuf;

use async_trait::async_trait;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use messup_types::api::UploadResponse;
use messup_types::models::MediaType;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// 50 MB upload limit
pub const MAX_MEDIA_SIZE: usize = 50 * 1024 * 1024;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// An attachment as it comes back out of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Where message attachments live. The core only ever keeps the URL.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, bytes: Bytes, content_hint: &str) -> Result<String, ApiError>;

    async fn fetch(&self, id: Uuid) -> Result<StoredMedia, ApiError>;
}

/// Media on the local filesystem, served back by this process under
/// `{public_url}/media/{id}`. Each file `<id>` has a `<id>.type` sidecar
/// holding the content type it was uploaded with.
pub struct LocalMediaStore {
    dir: PathBuf,
    public_url: String,
}

impl LocalMediaStore {
    pub fn new(dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, bytes: Bytes, content_hint: &str) -> Result<String, ApiError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            error!("Failed to create media directory {}: {}", self.dir.display(), e);
            ApiError::Upload("media storage unavailable".into())
        })?;

        let id = Uuid::new_v4();
        let path = self.dir.join(id.to_string());
        let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
            error!("Failed to create {}: {}", path.display(), e);
            ApiError::Upload("could not store media".into())
        })?;
        file.write_all(&bytes).await.map_err(|e| {
            error!("Failed to write {}: {}", path.display(), e);
            ApiError::Upload("could not store media".into())
        })?;

        let type_path = self.dir.join(format!("{}.type", id));
        tokio::fs::write(&type_path, content_hint).await.map_err(|e| {
            error!("Failed to write {}: {}", type_path.display(), e);
            ApiError::Upload("could not store media".into())
        })?;

        info!("Stored {} bytes of {} media as {}", bytes.len(), content_hint, id);
        Ok(format!("{}/media/{}", self.public_url, id))
    }

    async fn fetch(&self, id: Uuid) -> Result<StoredMedia, ApiError> {
        let path = self.dir.join(id.to_string());
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| ApiError::NotFound(format!("media not found: {}", id)))?;

        // Files stored before the sidecar existed are served as raw bytes
        let content_type = tokio::fs::read_to_string(self.dir.join(format!("{}.type", id)))
            .await
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|_| FALLBACK_CONTENT_TYPE.to_string());

        Ok(StoredMedia {
            bytes,
            content_type,
        })
    }
}

/// Validate and hand an attachment to the configured store.
pub async fn upload_media(
    state: &AppState,
    bytes: Bytes,
    content_hint: &str,
) -> Result<UploadResponse, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::Validation("media payload is empty".into()));
    }
    if bytes.len() > MAX_MEDIA_SIZE {
        return Err(ApiError::Validation(format!(
            "media exceeds {} bytes",
            MAX_MEDIA_SIZE
        )));
    }

    let url = state.media.upload(bytes, content_hint).await?;
    Ok(UploadResponse {
        url,
        media_type: MediaType::from_content_hint(content_hint),
    })
}

// -- Handlers --

pub async fn upload(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let hint = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string();

    let response = upload_media(&state, bytes, &hint).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /media/{id}. Public so the URL works as a plain `src` attribute;
/// ids are random UUIDs and are only handed out inside messages.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Only UUIDs map to files, which rules out path traversal
    let id: Uuid = id
        .parse()
        .map_err(|_| ApiError::Validation("invalid media id".into()))?;

    let media = state.media.fetch(id).await?;
    let content_type = HeaderValue::from_str(&media.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        ],
        media.bytes,
    ))
}
