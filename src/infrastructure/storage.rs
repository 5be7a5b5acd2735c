use crate::config::{StorageBackend, TransferConfig};
use crate::services::memory_storage::MemoryObjectStore;
use crate::services::storage::{ObjectStore, S3ObjectStore};
use anyhow::Result;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &TransferConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("🧠 In-memory storage (Bucket: {})", config.bucket);
            Ok(Arc::new(MemoryObjectStore::new(config.bucket.clone())))
        }
        StorageBackend::S3 => Ok(Arc::new(setup_s3(config).await?)),
    }
}

async fn setup_s3(config: &TransferConfig) -> Result<S3ObjectStore> {
    info!(
        "☁️  S3 Storage: {} (Bucket: {})",
        config.endpoint, config.bucket
    );

    let aws_config = aws_config::from_env()
        .endpoint_url(&config.endpoint)
        .region(Region::new(config.region.clone()))
        .credentials_provider(Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(&config.bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", config.bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", config.bucket);
            s3_client
                .create_bucket()
                .bucket(&config.bucket)
                .send()
                .await
                .map_err(|e| {
                    anyhow::anyhow!("Failed to create bucket '{}': {}", config.bucket, e)
                })?;
            info!("✅ Bucket '{}' created successfully", config.bucket);
        }
    }

    Ok(S3ObjectStore::new(s3_client, config.bucket.clone()))
}
