use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use tokio::io::AsyncRead;
use utoipa::ToSchema;

pub type PayloadReader = Box<dyn AsyncRead + Send + Unpin>;

/// Readable source of an upload's bytes.
#[async_trait]
pub trait Payload: Send + Sync {
    async fn open(&self) -> io::Result<PayloadReader>;
}

#[async_trait]
impl Payload for Bytes {
    async fn open(&self) -> io::Result<PayloadReader> {
        Ok(Box::new(io::Cursor::new(self.clone())))
    }
}

/// Payload spooled to a local file, opened lazily by the worker.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub path: PathBuf,
}

impl FilePayload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Payload for FilePayload {
    async fn open(&self) -> io::Result<PayloadReader> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }
}

pub struct UploadJob {
    pub payload: Box<dyn Payload>,
    /// Key prefix, e.g. `images/products/`. Concatenated verbatim with the file name.
    pub destination: String,
    /// Pre-generated, collision-resistant name. Never changed by the pipeline.
    pub file_name: String,
    pub extension: String,
}

impl UploadJob {
    pub fn new(
        payload: impl Payload + 'static,
        destination: impl Into<String>,
        file_name: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            payload: Box::new(payload),
            destination: destination.into(),
            file_name: file_name.into(),
            extension: extension.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}{}", self.destination, self.file_name)
    }

    pub fn content_type(&self) -> mime::Mime {
        match self.extension.to_lowercase().as_str() {
            "png" => mime::IMAGE_PNG,
            "jpg" | "jpeg" => mime::IMAGE_JPEG,
            "gif" => mime::IMAGE_GIF,
            _ => mime::APPLICATION_OCTET_STREAM,
        }
    }
}

impl std::fmt::Debug for UploadJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadJob")
            .field("destination", &self.destination)
            .field("file_name", &self.file_name)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadResult {
    pub file_name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeleteJob {
    pub destination: String,
    pub file_name: String,
}

impl DeleteJob {
    pub fn new(destination: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            file_name: file_name.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}{}", self.destination, self.file_name)
    }
}

/// `https://<host>/<bucket>/<key>`
pub fn public_url(host: &str, bucket: &str, key: &str) -> String {
    format!("https://{}/{}/{}", host, bucket, key)
}
