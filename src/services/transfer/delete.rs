use super::batch::BatchSession;
use super::error::TransferError;
use super::types::DeleteJob;
use tracing::debug;

/// Deletes one object, conditioned on the generation observed just before.
///
/// If the object is rewritten between the metadata fetch and the delete, the
/// store rejects the delete and the newer version survives. No retry here.
pub(super) async fn delete_one(session: BatchSession, job: DeleteJob) -> Result<(), TransferError> {
    let key = job.key();
    session.ensure_live(&key)?;
    let store = session.store();

    let meta = session
        .bounded(&key, store.stat(&key))
        .await?
        .map_err(|source| TransferError::Metadata {
            key: key.clone(),
            source,
        })?;

    session
        .bounded(&key, store.delete_if_generation(&key, &meta.generation))
        .await?
        .map_err(|source| TransferError::Delete {
            key: key.clone(),
            source,
        })?;

    debug!("Deleted {} at generation {}", key, meta.generation);
    Ok(())
}
