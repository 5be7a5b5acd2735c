use crate::config::{DrainPolicy, TransferConfig};
use crate::services::storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod batch;
pub mod delete;
pub mod error;
pub mod types;
pub mod upload;
pub mod visibility;

pub use batch::BatchSession;
pub use error::TransferError;
pub use types::{
    DeleteJob, FilePayload, Payload, PayloadReader, UploadJob, UploadResult, public_url,
};

use batch::{PoolSettings, run_batch};

/// Batch coordinator for bulk uploads and deletes against the object store.
pub struct TransferService {
    store: Arc<dyn ObjectStore>,
    public_host: String,
    workers: usize,
    batch_deadline: Duration,
    drain_policy: DrainPolicy,
}

impl TransferService {
    pub fn new(store: Arc<dyn ObjectStore>, config: &TransferConfig) -> Self {
        Self {
            store,
            public_host: config.public_host.clone(),
            workers: config.workers.max(1),
            batch_deadline: config.batch_deadline,
            drain_policy: config.drain_policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    fn open_session(&self) -> BatchSession {
        BatchSession::new(self.store.clone(), &self.public_host, self.batch_deadline)
    }

    fn settings(&self, pipeline: &'static str) -> PoolSettings {
        PoolSettings {
            workers: self.workers,
            drain_policy: self.drain_policy,
            pipeline,
        }
    }

    /// Uploads every job and makes each object publicly readable.
    ///
    /// Results are in completion order, not submission order. Either all jobs
    /// are reported or the first observed error is returned.
    pub async fn upload_batch(
        &self,
        jobs: Vec<UploadJob>,
    ) -> Result<Vec<UploadResult>, TransferError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let count = jobs.len();
        info!(
            "📤 Uploading {} files to bucket '{}' with {} workers",
            count,
            self.store.bucket(),
            self.workers
        );

        let results = run_batch(
            self.settings("upload"),
            self.open_session(),
            jobs,
            upload::upload_one,
        )
        .await?;

        info!("✅ Uploaded {} files", results.len());
        Ok(results)
    }

    /// Deletes every job's object with a generation-checked delete.
    pub async fn delete_batch(&self, jobs: Vec<DeleteJob>) -> Result<(), TransferError> {
        if jobs.is_empty() {
            return Ok(());
        }

        let count = jobs.len();
        info!(
            "🗑️  Deleting {} files from bucket '{}' with {} workers",
            count,
            self.store.bucket(),
            self.workers
        );

        run_batch(
            self.settings("delete"),
            self.open_session(),
            jobs,
            delete::delete_one,
        )
        .await?;

        info!("✅ Deleted {} files", count);
        Ok(())
    }
}
