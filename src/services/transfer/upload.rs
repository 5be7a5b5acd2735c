use super::batch::BatchSession;
use super::error::TransferError;
use super::types::{UploadJob, UploadResult};
use super::visibility::grant_public_read;
use crate::services::storage::ObjectWriter;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Uploads one job: read the payload, write and finalize the object, then make it public.
///
/// Any failure aborts only this job; the worker moves on to the next one.
pub(super) async fn upload_one(
    session: BatchSession,
    job: UploadJob,
) -> Result<UploadResult, TransferError> {
    let key = job.key();
    session.ensure_live(&key)?;

    let mut reader = session
        .bounded(&key, job.payload.open())
        .await?
        .map_err(|source| TransferError::PayloadOpen {
            key: key.clone(),
            source,
        })?;

    let mut data = Vec::new();
    session
        .bounded(&key, reader.read_to_end(&mut data))
        .await?
        .map_err(|source| TransferError::PayloadRead {
            key: key.clone(),
            source,
        })?;
    drop(reader);

    let store = session.store();
    let content_type = job.content_type();

    let mut writer = session
        .bounded(&key, store.open_writer(&key, content_type.as_ref()))
        .await?
        .map_err(|source| TransferError::Write {
            key: key.clone(),
            source,
        })?;

    let size = data.len();
    let written = match session.bounded(&key, writer.write(Bytes::from(data))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(TransferError::Write {
            key: key.clone(),
            source,
        }),
        Err(deadline) => Err(deadline),
    };
    if let Err(e) = written {
        return Err(abort_upload(&session, &key, writer, e).await);
    }

    // The object must be finalized before its visibility can change
    let finished = match session.bounded(&key, writer.finish()).await {
        Ok(Ok(meta)) => Ok(meta),
        Ok(Err(source)) => Err(TransferError::Finalize {
            key: key.clone(),
            source,
        }),
        Err(deadline) => Err(deadline),
    };
    let meta = match finished {
        Ok(meta) => meta,
        Err(e) => return Err(abort_upload(&session, &key, writer, e).await),
    };

    grant_public_read(&session, &key).await?;

    debug!(
        "Uploaded {} ({} bytes, generation {})",
        key, size, meta.generation
    );

    Ok(UploadResult {
        url: session.public_url(&key),
        file_name: job.file_name,
    })
}

/// Releases a partial upload and hands back the error that caused it.
async fn abort_upload(
    session: &BatchSession,
    key: &str,
    writer: Box<dyn ObjectWriter>,
    cause: TransferError,
) -> TransferError {
    warn!("Aborting upload of {}: {}", key, cause);
    session.cleanup(key, writer.abort()).await;
    cause
}
