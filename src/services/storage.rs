use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Optimistic-concurrency token the store assigns on every write.
///
/// Opaque to callers: the only meaningful operation is equality with the
/// token returned by a later metadata fetch. On versioned buckets the token
/// is also pinned to the object version it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Generation {
    token: String,
    version_id: Option<String>,
}

impl Generation {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            version_id: None,
        }
    }

    pub fn with_version_id(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }
}

impl From<u64> for Generation {
    fn from(value: u64) -> Self {
        Self::new(value.to_string())
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_id {
            Some(version) => write!(f, "{} (version {})", self.token, version),
            None => f.write_str(&self.token),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub key: String,
    pub generation: Generation,
    pub size: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error("generation mismatch on {key}: expected {expected}")]
    GenerationMismatch { key: String, expected: Generation },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Streaming write of a single object. Nothing is visible under the key
/// until `finish` succeeds.
///
/// A writer whose `write` or `finish` failed, or was cancelled, must be
/// passed to `abort` so the store can release the partial upload.
#[async_trait]
pub trait ObjectWriter: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError>;

    async fn finish(&mut self) -> Result<ObjectMeta, StoreError>;

    /// Discards everything written so far. Best effort.
    async fn abort(self: Box<Self>);
}

/// Remote object storage as seen by the transfer pipeline.
///
/// Implementations must be safe to share between concurrently running
/// workers; every call is independent per key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    fn backend_name(&self) -> &'static str;

    async fn open_writer(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StoreError>;

    async fn grant_public_read(&self, key: &str) -> Result<(), StoreError>;

    async fn stat(&self, key: &str) -> Result<ObjectMeta, StoreError>;

    /// Deletes `key` only if its current generation is still `generation`.
    async fn delete_if_generation(
        &self,
        key: &str,
        generation: &Generation,
    ) -> Result<(), StoreError>;
}

fn http_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn open_writer(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(anyhow::Error::from)?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow::anyhow!("No upload ID for {}", key))?
            .to_string();

        Ok(Box::new(S3ObjectWriter {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            upload_id,
            parts: Vec::new(),
            next_part: 1,
            size: 0,
        }))
    }

    async fn grant_public_read(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let res = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                let not_found = e.as_service_error().is_some_and(|s| s.is_not_found())
                    || http_status(&e) == Some(404);
                if not_found {
                    return Err(StoreError::NotFound(key.to_string()));
                }
                return Err(anyhow::Error::from(e).into());
            }
        };

        let generation = res
            .e_tag()
            .map(Generation::new)
            .ok_or_else(|| anyhow::anyhow!("Object {} has no ETag", key))?;

        // Unversioned buckets report the literal version "null"
        let generation = match res.version_id().filter(|v| *v != "null") {
            Some(version_id) => generation.with_version_id(version_id),
            None => generation,
        };

        let updated_at = res.last_modified().map(|d| {
            DateTime::from_timestamp(d.secs(), d.subsec_nanos()).unwrap_or_default()
        });

        Ok(ObjectMeta {
            key: key.to_string(),
            generation,
            size: res.content_length().unwrap_or(0).max(0) as u64,
            updated_at,
        })
    }

    async fn delete_if_generation(
        &self,
        key: &str,
        generation: &Generation,
    ) -> Result<(), StoreError> {
        let req = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .if_match(generation.as_str());

        // A pinned version never removes a newer write, even one with identical bytes
        let req = match generation.version_id() {
            Some(version_id) => req.version_id(version_id),
            None => req,
        };

        let res = req.send().await;

        match res {
            Ok(_) => Ok(()),
            Err(e) => match http_status(&e) {
                Some(412) => Err(StoreError::GenerationMismatch {
                    key: key.to_string(),
                    expected: generation.clone(),
                }),
                Some(404) => Err(StoreError::NotFound(key.to_string())),
                _ => {
                    tracing::error!(
                        "S3 conditional delete failed: bucket={}, key={}, error={:?}",
                        self.bucket,
                        key,
                        e
                    );
                    Err(anyhow::Error::from(e).into())
                }
            },
        }
    }
}

/// Multipart upload that completes on `finish`.
pub struct S3ObjectWriter {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
    next_part: i32,
    size: u64,
}

#[async_trait]
impl ObjectWriter for S3ObjectWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        let len = chunk.len() as u64;
        let upload_part_res = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .body(ByteStream::from(chunk))
            .part_number(self.next_part)
            .send()
            .await
            .map_err(anyhow::Error::from)?;

        self.parts.push(
            CompletedPart::builder()
                .e_tag(upload_part_res.e_tag().unwrap_or_default())
                .part_number(self.next_part)
                .build(),
        );

        self.next_part += 1;
        self.size += len;
        Ok(())
    }

    async fn finish(&mut self) -> Result<ObjectMeta, StoreError> {
        // S3 refuses to complete an upload without parts
        if self.parts.is_empty() {
            self.write(Bytes::new()).await?;
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();

        let res = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(anyhow::Error::from)?;

        let generation = res
            .e_tag()
            .map(Generation::new)
            .ok_or_else(|| anyhow::anyhow!("Completed upload of {} has no ETag", self.key))?;

        Ok(ObjectMeta {
            key: self.key.clone(),
            generation,
            size: self.size,
            updated_at: Some(Utc::now()),
        })
    }

    async fn abort(self: Box<Self>) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
        {
            tracing::warn!(
                "S3 abort_multipart_upload failed: key={}, upload_id={}, error={:?}",
                self.key,
                self.upload_id,
                e
            );
        }
    }
}
