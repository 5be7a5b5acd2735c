use super::error::TransferError;
use super::types::public_url;
use crate::config::DrainPolicy;
use crate::services::storage::ObjectStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, warn};

/// Slack the coordinator grants workers past the deadline to report their
/// own deadline errors before it gives up on them.
const DEADLINE_GRACE: Duration = Duration::from_millis(500);

/// Budget for releasing a partial upload, which may run after the deadline.
/// Kept below `DEADLINE_GRACE` so the keyed failure still reaches the coordinator.
const CLEANUP_GRACE: Duration = Duration::from_millis(250);

/// One client session per batch: the shared store handle plus the batch deadline.
///
/// Every worker receives a clone. Dropping the last clone releases the session.
#[derive(Clone)]
pub struct BatchSession {
    store: Arc<dyn ObjectStore>,
    public_host: Arc<str>,
    deadline: Instant,
}

impl BatchSession {
    pub fn new(store: Arc<dyn ObjectStore>, public_host: &str, timeout: Duration) -> Self {
        Self {
            store,
            public_host: Arc::from(public_host),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn public_url(&self, key: &str) -> String {
        public_url(&self.public_host, self.store.bucket(), key)
    }

    /// Fails fast for jobs picked up after the deadline has already passed.
    pub fn ensure_live(&self, key: &str) -> Result<(), TransferError> {
        if Instant::now() >= self.deadline {
            return Err(TransferError::DeadlineExceeded {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Runs a best-effort cleanup step, allowed to outlive the deadline by `CLEANUP_GRACE`.
    pub async fn cleanup<F: Future<Output = ()>>(&self, key: &str, fut: F) {
        let until = Instant::now().max(self.deadline) + CLEANUP_GRACE;
        if timeout_at(until, fut).await.is_err() {
            warn!("Cleanup of {} did not finish in time", key);
        }
    }

    /// Runs one blocking I/O step under the batch deadline.
    pub async fn bounded<F: Future>(&self, key: &str, fut: F) -> Result<F::Output, TransferError> {
        timeout_at(self.deadline, fut)
            .await
            .map_err(|_| TransferError::DeadlineExceeded {
                key: key.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy)]
pub(super) struct PoolSettings {
    pub workers: usize,
    pub drain_policy: DrainPolicy,
    pub pipeline: &'static str,
}

/// Drains `jobs` through a fixed pool of workers and aggregates one outcome per job.
///
/// Returns every value (in completion order) when all jobs succeed, otherwise the
/// first error observed.
pub(super) async fn run_batch<J, T, F, Fut>(
    settings: PoolSettings,
    session: BatchSession,
    jobs: Vec<J>,
    work: F,
) -> Result<Vec<T>, TransferError>
where
    J: Send + 'static,
    T: Send + 'static,
    F: Fn(BatchSession, J) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, TransferError>> + Send + 'static,
{
    let expected = jobs.len();
    if expected == 0 {
        return Ok(Vec::new());
    }

    let (job_tx, job_rx) = mpsc::channel::<J>(expected);
    for job in jobs {
        job_tx
            .send(job)
            .await
            .map_err(|_| TransferError::WorkersLost {
                completed: 0,
                expected,
            })?;
    }
    // Closed for writing: workers exit once the queue is drained
    drop(job_tx);

    let queue = Arc::new(Mutex::new(job_rx));
    let (outcome_tx, mut outcome_rx) = mpsc::channel::<Result<T, TransferError>>(expected);
    let collect_until = session.deadline() + DEADLINE_GRACE;

    let mut handles = Vec::with_capacity(settings.workers);
    for worker_id in 0..settings.workers {
        let queue = queue.clone();
        let outcome_tx = outcome_tx.clone();
        let session = session.clone();
        let work = work.clone();
        let pipeline = settings.pipeline;

        handles.push(tokio::spawn(async move {
            let mut processed = 0usize;
            loop {
                // Guard is released before the job runs
                let job = {
                    let mut rx = queue.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else { break };

                let outcome = work(session.clone(), job).await;
                processed += 1;

                // Capacity equals the batch length; a send only fails after a
                // detached coordinator has already returned.
                let _ = outcome_tx.send(outcome).await;
            }
            debug!(
                "{} worker {} finished after {} jobs",
                pipeline, worker_id, processed
            );
        }));
    }
    drop(outcome_tx);
    drop(session);

    let mut results = Vec::with_capacity(expected);
    let mut first_error: Option<TransferError> = None;
    let mut completed = 0usize;

    while completed < expected {
        let outcome = match timeout_at(collect_until, outcome_rx.recv()).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                error!(
                    "❌ {} workers exited after {} of {} jobs",
                    settings.pipeline, completed, expected
                );
                return Err(first_error.unwrap_or(TransferError::WorkersLost {
                    completed,
                    expected,
                }));
            }
            Err(_) => {
                warn!(
                    "⏰ {} batch deadline exceeded after {} of {} jobs",
                    settings.pipeline, completed, expected
                );
                return Err(first_error.unwrap_or(TransferError::BatchDeadlineExceeded {
                    completed,
                    expected,
                }));
            }
        };
        completed += 1;

        match outcome {
            Ok(value) => results.push(value),
            Err(e) => {
                warn!("⚠️  {} job failed: {}", settings.pipeline, e);
                if first_error.is_none() {
                    if settings.drain_policy == DrainPolicy::Detach {
                        return Err(e);
                    }
                    first_error = Some(e);
                }
            }
        }
    }

    for joined in futures::future::join_all(handles).await {
        if let Err(e) = joined {
            error!("{} worker panicked: {}", settings.pipeline, e);
        }
    }

    match first_error {
        Some(e) => {
            if !results.is_empty() {
                warn!(
                    "{} of {} {} jobs succeeded in a failed batch and are not reported",
                    results.len(),
                    expected,
                    settings.pipeline
                );
            }
            Err(e)
        }
        None => Ok(results),
    }
}
