use super::batch::BatchSession;
use super::error::TransferError;

/// Grants read access to all principals on a finalized object.
///
/// The bytes are already durable when this runs; a failure here still fails
/// the job and nothing is rolled back.
pub(super) async fn grant_public_read(
    session: &BatchSession,
    key: &str,
) -> Result<(), TransferError> {
    session
        .bounded(key, session.store().grant_public_read(key))
        .await?
        .map_err(|source| TransferError::Visibility {
            key: key.to_string(),
            source,
        })
}
