use async_trait::async_trait;
use bytes::Bytes;
use media_transfer::config::{DrainPolicy, TransferConfig};
use media_transfer::services::memory_storage::{FaultPoint, MemoryObjectStore};
use media_transfer::services::storage::{
    Generation, ObjectMeta, ObjectStore, ObjectWriter, StoreError,
};
use media_transfer::services::transfer::{
    FilePayload, Payload, PayloadReader, TransferError, TransferService, UploadJob,
};
use std::collections::HashSet;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, ReadBuf};

const DESTINATION: &str = "images/test/";

fn setup(config: TransferConfig) -> (MemoryObjectStore, TransferService) {
    let store = MemoryObjectStore::new(config.bucket.clone());
    let service = TransferService::new(Arc::new(store.clone()), &config);
    (store, service)
}

fn image_job(name: &str) -> UploadJob {
    let ext = name.rsplit('.').next().unwrap_or_default().to_string();
    UploadJob::new(
        Bytes::from(format!("bytes of {}", name)),
        DESTINATION,
        name,
        ext,
    )
}

struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "stream reset",
        )))
    }
}

struct BrokenPayload;

#[async_trait]
impl Payload for BrokenPayload {
    async fn open(&self) -> io::Result<PayloadReader> {
        Ok(Box::new(BrokenReader))
    }
}

/// Payload that only becomes readable after a delay.
struct SlowPayload {
    delay: Duration,
    data: Bytes,
}

#[async_trait]
impl Payload for SlowPayload {
    async fn open(&self) -> io::Result<PayloadReader> {
        tokio::time::sleep(self.delay).await;
        Ok(Box::new(io::Cursor::new(self.data.clone())))
    }
}

/// Store whose writers never complete: `finish` fails, or stalls when a
/// delay is set. Records whether the pipeline released the upload.
struct UnfinishableStore {
    inner: MemoryObjectStore,
    stall: Option<Duration>,
    aborted: Arc<AtomicBool>,
}

struct UnfinishableWriter {
    stall: Option<Duration>,
    aborted: Arc<AtomicBool>,
}

#[async_trait]
impl ObjectWriter for UnfinishableWriter {
    async fn write(&mut self, _chunk: Bytes) -> Result<(), StoreError> {
        Ok(())
    }

    async fn finish(&mut self) -> Result<ObjectMeta, StoreError> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        Err(anyhow::anyhow!("complete failed").into())
    }

    async fn abort(self: Box<Self>) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for UnfinishableStore {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    fn backend_name(&self) -> &'static str {
        "unfinishable"
    }

    async fn open_writer(
        &self,
        _key: &str,
        _content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        Ok(Box::new(UnfinishableWriter {
            stall: self.stall,
            aborted: self.aborted.clone(),
        }))
    }

    async fn grant_public_read(&self, key: &str) -> Result<(), StoreError> {
        self.inner.grant_public_read(key).await
    }

    async fn stat(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        self.inner.stat(key).await
    }

    async fn delete_if_generation(
        &self,
        key: &str,
        generation: &Generation,
    ) -> Result<(), StoreError> {
        self.inner.delete_if_generation(key, generation).await
    }
}

fn unfinishable(stall: Option<Duration>) -> (Arc<AtomicBool>, Arc<dyn ObjectStore>) {
    let aborted = Arc::new(AtomicBool::new(false));
    let store = UnfinishableStore {
        inner: MemoryObjectStore::new("bucket"),
        stall,
        aborted: aborted.clone(),
    };
    (aborted, Arc::new(store))
}

#[tokio::test]
async fn test_upload_three_images() {
    let (store, service) = setup(TransferConfig::development());

    let jobs = vec![image_job("a.png"), image_job("b.jpg"), image_job("c.jpeg")];
    let results = service.upload_batch(jobs).await.unwrap();

    assert_eq!(results.len(), 3);
    let urls: HashSet<String> = results.iter().map(|r| r.url.clone()).collect();
    let expected: HashSet<String> = ["a.png", "b.jpg", "c.jpeg"]
        .iter()
        .map(|n| format!("https://storage.example/bucket/images/test/{}", n))
        .collect();
    assert_eq!(urls, expected);

    for result in &results {
        assert!(!result.file_name.is_empty());
        let url = url::Url::parse(&result.url).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("storage.example"));
        assert!(url.path().ends_with(&result.file_name));
        assert!(url.path().contains(DESTINATION));
    }

    let stored = store.get("images/test/a.png").unwrap();
    assert_eq!(&stored.data[..], b"bytes of a.png");
    assert_eq!(stored.content_type, "image/png");
    assert!(stored.public);
    assert_eq!(store.get("images/test/c.jpeg").unwrap().content_type, "image/jpeg");
    assert!(store.is_public("images/test/b.jpg"));
}

#[tokio::test]
async fn test_batch_larger_than_pool() {
    let (store, service) = setup(TransferConfig::development());

    let jobs: Vec<UploadJob> = (0..23).map(|i| image_job(&format!("{}.png", i))).collect();
    let results = service.upload_batch(jobs).await.unwrap();

    assert_eq!(results.len(), 23);
    let names: HashSet<&str> = results.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names.len(), 23);
    assert_eq!(store.len(), 23);
}

#[tokio::test]
async fn test_empty_batch_is_noop() {
    let (store, service) = setup(TransferConfig::development());
    let results = service.upload_batch(Vec::new()).await.unwrap();
    assert!(results.is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_write_failure_fails_whole_batch() {
    let (store, service) = setup(TransferConfig::development());
    store.inject_fault(FaultPoint::Write, "images/test/b.jpg");

    let jobs = vec![image_job("a.png"), image_job("b.jpg"), image_job("c.jpeg")];
    let err = service.upload_batch(jobs).await.unwrap_err();

    assert!(matches!(err, TransferError::Write { .. }));
    assert_eq!(err.key(), Some("images/test/b.jpg"));

    // Other jobs still ran to completion; nothing is rolled back
    assert!(!store.contains("images/test/b.jpg"));
    assert!(store.is_public("images/test/a.png"));
    assert!(store.is_public("images/test/c.jpeg"));
}

#[tokio::test]
async fn test_finalize_failure_leaves_nothing_behind() {
    let (store, service) = setup(TransferConfig::development());
    store.inject_fault(FaultPoint::Finalize, "images/test/a.png");

    let err = service
        .upload_batch(vec![image_job("a.png")])
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Finalize { .. }));
    assert!(!store.contains("images/test/a.png"));
}

#[tokio::test]
async fn test_failed_finalize_releases_upload() {
    let (aborted, store) = unfinishable(None);
    let service = TransferService::new(store, &TransferConfig::development());

    let err = service
        .upload_batch(vec![image_job("a.png")])
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Finalize { .. }));
    assert!(err.to_string().contains("complete failed"));
    assert!(aborted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_finalize_past_deadline_releases_upload() {
    let config = TransferConfig {
        batch_deadline: Duration::from_millis(100),
        ..TransferConfig::development()
    };
    let (aborted, store) = unfinishable(Some(Duration::from_secs(5)));
    let service = TransferService::new(store, &config);

    let started = Instant::now();
    let err = service
        .upload_batch(vec![image_job("a.png")])
        .await
        .unwrap_err();

    assert!(err.is_deadline(), "unexpected error: {}", err);
    assert_eq!(err.key(), Some("images/test/a.png"));
    assert!(aborted.load(Ordering::SeqCst));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_visibility_failure_is_job_failure() {
    let (store, service) = setup(TransferConfig::development());
    store.inject_fault(FaultPoint::Visibility, "images/test/a.png");

    let err = service
        .upload_batch(vec![image_job("a.png")])
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Visibility { .. }));
    // Written but not public
    assert!(store.contains("images/test/a.png"));
    assert!(!store.is_public("images/test/a.png"));
}

#[tokio::test]
async fn test_payload_open_failure() {
    let (store, service) = setup(TransferConfig::development());
    let job = UploadJob::new(
        FilePayload::new("/nonexistent/upload.png"),
        DESTINATION,
        "missing.png",
        "png",
    );

    let err = service.upload_batch(vec![job]).await.unwrap_err();
    assert!(matches!(err, TransferError::PayloadOpen { .. }));
    assert_eq!(err.key(), Some("images/test/missing.png"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_payload_read_failure() {
    let (store, service) = setup(TransferConfig::development());
    let job = UploadJob::new(BrokenPayload, DESTINATION, "broken.png", "png");

    let err = service.upload_batch(vec![job]).await.unwrap_err();
    assert!(matches!(err, TransferError::PayloadRead { .. }));
    assert!(err.to_string().contains("stream reset"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_file_payload_upload() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"\x89PNG\r\n\x1a\nfake image").unwrap();

    let (store, service) = setup(TransferConfig::development());
    let job = UploadJob::new(FilePayload::new(file.path()), "products/", "p1.png", "png");

    let results = service.upload_batch(vec![job]).await.unwrap();
    assert_eq!(results[0].url, "https://storage.example/bucket/products/p1.png");
    assert_eq!(
        &store.get("products/p1.png").unwrap().data[..],
        b"\x89PNG\r\n\x1a\nfake image"
    );
}

#[tokio::test]
async fn test_deadline_cancels_in_flight_jobs() {
    let config = TransferConfig {
        batch_deadline: Duration::from_millis(100),
        ..TransferConfig::development()
    };
    let store = MemoryObjectStore::new("bucket").with_latency(Duration::from_secs(5));
    let service = TransferService::new(Arc::new(store.clone()), &config);

    let started = Instant::now();
    let jobs: Vec<UploadJob> = (0..8).map(|i| image_job(&format!("{}.png", i))).collect();
    let err = service.upload_batch(jobs).await.unwrap_err();

    assert!(err.is_deadline(), "unexpected error: {}", err);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_detach_policy_returns_first_error() {
    let config = TransferConfig {
        drain_policy: DrainPolicy::Detach,
        workers: 2,
        ..TransferConfig::development()
    };
    let (store, service) = setup(config);

    let jobs = vec![
        UploadJob::new(BrokenPayload, DESTINATION, "broken.png", "png"),
        UploadJob::new(
            SlowPayload {
                delay: Duration::from_secs(2),
                data: Bytes::from_static(b"late"),
            },
            DESTINATION,
            "late.png",
            "png",
        ),
    ];

    let started = Instant::now();
    let err = service.upload_batch(jobs).await.unwrap_err();

    assert_eq!(err.key(), Some("images/test/broken.png"));
    // Returned without waiting on the slow job
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!store.contains("images/test/late.png"));
}

#[tokio::test]
async fn test_await_drain_waits_for_slow_jobs() {
    let config = TransferConfig {
        workers: 2,
        ..TransferConfig::development()
    };
    let (store, service) = setup(config);

    let jobs = vec![
        UploadJob::new(BrokenPayload, DESTINATION, "broken.png", "png"),
        UploadJob::new(
            SlowPayload {
                delay: Duration::from_millis(300),
                data: Bytes::from_static(b"late"),
            },
            DESTINATION,
            "late.png",
            "png",
        ),
    ];

    let err = service.upload_batch(jobs).await.unwrap_err();

    assert_eq!(err.key(), Some("images/test/broken.png"));
    assert!(store.is_public("images/test/late.png"));
}
