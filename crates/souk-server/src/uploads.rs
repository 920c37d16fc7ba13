//! Staging and forwarding of product images to the external image store.
//!
//! Multipart uploads land on local disk first under a random prefix, then get
//! forwarded one at a time. The store answers with the public URL the catalog
//! keeps; the staged copy is deleted once the forward succeeds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use souk_core::{ident, AppConfig};

/// A product carries at most this many images.
pub const MAX_PRODUCT_IMAGES: usize = 5;

const USER_AGENT: &str = concat!("souk-server/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum UploadError {
    /// The store answered with a non-success status.
    #[error("image store rejected the upload with status {0}")]
    Rejected(u16),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// HTTP client for the image store service.
#[derive(Debug, Clone)]
pub struct ImageStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ImageStore {
    /// # Errors
    ///
    /// Returns the underlying [`reqwest::Error`] when the client cannot be
    /// built with the configured timeout.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.image_store_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: config.image_store_url.trim_end_matches('/').to_string(),
            api_key: config.image_store_key.clone(),
        })
    }

    /// Client pointed at an arbitrary base URL, with default timeouts and no
    /// API key. Route tests aim this at a mock server.
    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Forwards one staged file and returns the public URL the store assigned.
    /// The staged file is removed after a successful forward; on failure it is
    /// left in place.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Io`] when the staged file cannot be read,
    /// [`UploadError::Transport`] on connection or decode failures and
    /// [`UploadError::Rejected`] when the store answers outside the 2xx range.
    pub async fn upload(&self, staged: &Path) -> Result<String, UploadError> {
        let file_name = staged
            .file_name()
            .map_or_else(|| "upload".to_string(), |name| name.to_string_lossy().into_owned());
        let bytes = tokio::fs::read(staged).await?;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut request = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(UploadError::Rejected(response.status().as_u16()));
        }
        let uploaded: UploadedImage = response.json().await?;

        if let Err(error) = tokio::fs::remove_file(staged).await {
            tracing::warn!(%error, path = %staged.display(), "staged file cleanup failed");
        }
        Ok(uploaded.url)
    }

    /// Best-effort removal of an already-forwarded image. Failures are logged
    /// and swallowed; the catalog write that triggered the rollback has
    /// already been abandoned.
    pub async fn delete(&self, url: &str) {
        let mut request = self
            .client
            .delete(format!("{}/upload", self.base_url))
            .query(&[("url", url)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(url, status = %response.status(), "image delete rejected");
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, url, "image delete failed"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadedImage {
    url: String,
}

/// Writes one uploaded part into the staging directory as
/// `{random prefix}-{sanitized original name}` and returns the staged path.
///
/// # Errors
///
/// Returns [`UploadError::Io`] when the directory or file cannot be written.
pub async fn stage_image(dir: &Path, original_name: &str, bytes: &[u8]) -> Result<PathBuf, UploadError> {
    tokio::fs::create_dir_all(dir).await?;
    let staged = dir.join(format!("{}-{}", ident::upload_prefix(), sanitize_file_name(original_name)));
    tokio::fs::write(&staged, bytes).await?;
    Ok(staged)
}

/// Client file names pass through shells and URLs later; anything outside a
/// conservative character set becomes a dash.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
