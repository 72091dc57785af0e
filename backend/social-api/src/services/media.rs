/// Media upload
///
/// Files are handed to an external image host and only the returned URL is
/// kept. `CloudinaryStore` talks to Cloudinary's signed upload API;
/// `MemoryMediaStore` keeps bytes in process for tests and local runs.
use crate::metrics;
use async_trait::async_trait;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

pub const IMAGE_FORMATS: &[&str] = &["jpg", "png", "jpeg", "gif"];

#[derive(Error, Debug)]
pub enum UploadError {
    /// The file itself is unacceptable (format, size, empty)
    #[error("{0}")]
    Rejected(String),

    #[error("Media host unreachable: {0}")]
    Transport(String),

    #[error("Media host rejected the upload ({status}): {message}")]
    Host { status: u16, message: String },

    #[error("Unexpected media host response: {0}")]
    InvalidResponse(String),
}

/// A file received from a client, not yet uploaded.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Where an upload goes and what it may contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConstraints {
    pub folder: &'static str,
    pub allowed_formats: &'static [&'static str],
    pub max_bytes: usize,
}

impl UploadConstraints {
    pub fn posts(max_bytes: usize) -> Self {
        Self::images("posts", max_bytes)
    }

    pub fn avatars(max_bytes: usize) -> Self {
        Self::images("avatars", max_bytes)
    }

    pub fn covers(max_bytes: usize) -> Self {
        Self::images("covers", max_bytes)
    }

    fn images(folder: &'static str, max_bytes: usize) -> Self {
        Self {
            folder,
            allowed_formats: IMAGE_FORMATS,
            max_bytes,
        }
    }

    /// Check a file against the constraints, returning its normalized extension.
    pub fn check(&self, filename: &str, len: usize) -> Result<String, UploadError> {
        if len == 0 {
            return Err(UploadError::Rejected(format!("File '{filename}' is empty")));
        }
        if len > self.max_bytes {
            return Err(UploadError::Rejected(format!(
                "File '{filename}' exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !self.allowed_formats.contains(&ext.as_str()) {
            return Err(UploadError::Rejected(format!(
                "File '{filename}' must be one of: {}",
                self.allowed_formats.join(", ")
            )));
        }
        Ok(ext)
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store one file and return its public URL.
    async fn store(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        constraints: &UploadConstraints,
    ) -> Result<String, UploadError>;
}

/// Upload one file, recording the outcome.
pub async fn upload(
    media: &dyn MediaStore,
    file: UploadedFile,
    constraints: &UploadConstraints,
) -> Result<String, UploadError> {
    constraints.check(&file.filename, file.bytes.len())?;

    let size = file.bytes.len();
    match media.store(file.bytes, &file.filename, constraints).await {
        Ok(url) => {
            metrics::record_upload(constraints.folder, "success");
            debug!(folder = constraints.folder, size, "media stored");
            Ok(url)
        }
        Err(err) => {
            metrics::record_upload(constraints.folder, "failure");
            warn!(folder = constraints.folder, error = %err, "media upload failed");
            Err(err)
        }
    }
}

/// Upload every file in order; the first failure aborts the batch.
pub async fn upload_all(
    media: &dyn MediaStore,
    files: Vec<UploadedFile>,
    constraints: &UploadConstraints,
) -> Result<Vec<String>, UploadError> {
    for file in &files {
        constraints.check(&file.filename, file.bytes.len())?;
    }

    let mut urls = Vec::with_capacity(files.len());
    for file in files {
        urls.push(upload(media, file, constraints).await?);
    }
    Ok(urls)
}

#[derive(Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: String,
}

#[derive(Deserialize)]
struct CloudinaryErrorResponse {
    error: CloudinaryErrorBody,
}

#[derive(Deserialize)]
struct CloudinaryErrorBody {
    message: String,
}

/// Signed uploads to Cloudinary.
pub struct CloudinaryStore {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl CloudinaryStore {
    pub fn new(cloud_name: String, api_key: String, api_secret: String) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            cloud_name,
            api_key,
            api_secret,
            base_url: "https://api.cloudinary.com/v1_1".to_string(),
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/{}/image/upload", self.base_url, self.cloud_name)
    }

    /// Parameters that take part in the signature, in signing order.
    fn signed_params(constraints: &UploadConstraints, timestamp: i64) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("allowed_formats", constraints.allowed_formats.join(",")),
            ("folder", constraints.folder.to_string()),
            ("timestamp", timestamp.to_string()),
        ];
        params.sort_by(|a, b| a.0.cmp(b.0));
        params
    }

    fn sign(params: &[(&'static str, String)], api_secret: &str) -> String {
        let to_sign = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha1::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn store(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        constraints: &UploadConstraints,
    ) -> Result<String, UploadError> {
        let params = Self::signed_params(constraints, chrono::Utc::now().timestamp());
        let signature = Self::sign(&params, &self.api_secret);

        let mut form = reqwest::multipart::Form::new()
            .text("api_key", self.api_key.clone())
            .text("signature", signature);
        for (key, value) in params {
            form = form.text(key, value);
        }
        form = form.part(
            "file",
            reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string()),
        );

        let resp = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<CloudinaryErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "no error message".to_string());
            return Err(UploadError::Host {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp
            .json::<CloudinaryUploadResponse>()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
        Ok(body.secure_url)
    }
}

/// Keeps uploads in process.
#[derive(Default)]
pub struct MemoryMediaStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stored_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.objects.lock().await.get(url).cloned()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn store(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        constraints: &UploadConstraints,
    ) -> Result<String, UploadError> {
        let ext = constraints.check(filename, bytes.len())?;
        let url = format!("memory://{}/{}.{}", constraints.folder, Uuid::new_v4(), ext);
        self.objects.lock().await.insert(url.clone(), bytes);
        Ok(url)
    }
}
