use crate::services::storage::{Generation, ObjectMeta, ObjectStore, ObjectWriter, StoreError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Operation on which a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Write,
    Finalize,
    Visibility,
    Stat,
    Delete,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub generation: u64,
    pub public: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: DashMap<String, StoredObject>,
    next_generation: AtomicU64,
    faults: DashSet<(FaultPoint, String)>,
    latency_ms: AtomicU64,
}

impl Inner {
    fn bump_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check_fault(&self, point: FaultPoint, key: &str) -> Result<(), StoreError> {
        if self.faults.contains(&(point, key.to_string())) {
            return Err(anyhow::anyhow!("injected {:?} fault on {}", point, key).into());
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn insert(&self, key: &str, data: Bytes, content_type: &str) -> ObjectMeta {
        let generation = self.bump_generation();
        let updated_at = Utc::now();
        let size = data.len() as u64;
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                generation,
                public: false,
                updated_at,
            },
        );
        ObjectMeta {
            key: key.to_string(),
            generation: Generation::from(generation),
            size,
            updated_at: Some(updated_at),
        }
    }
}

/// Process-local object store with store-assigned monotonic generations.
///
/// Used for development (`STORAGE_BACKEND=memory`) and tests. Faults and
/// latency can be injected per operation to exercise every failure path of
/// the transfer pipeline.
#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    bucket: String,
    inner: Arc<Inner>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            inner: Arc::new(Inner::default()),
        }
    }

    /// Delay applied to every remote operation.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
        self
    }

    pub fn inject_fault(&self, point: FaultPoint, key: &str) {
        self.inner.faults.insert((point, key.to_string()));
    }

    pub fn clear_faults(&self) {
        self.inner.faults.clear();
    }

    /// Writes an object directly, bypassing the writer. Returns its new generation.
    pub fn put(&self, key: &str, data: impl Into<Bytes>) -> Generation {
        self.inner
            .insert(key, data.into(), mime::APPLICATION_OCTET_STREAM.as_ref())
            .generation
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.inner.objects.get(key).map(|o| o.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.objects.contains_key(key)
    }

    pub fn is_public(&self, key: &str) -> bool {
        self.inner.objects.get(key).is_some_and(|o| o.public)
    }

    pub fn len(&self) -> usize {
        self.inner.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn open_writer(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<Box<dyn ObjectWriter>, StoreError> {
        self.inner.simulate_latency().await;
        Ok(Box::new(MemoryObjectWriter {
            inner: self.inner.clone(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            buffer: BytesMut::new(),
        }))
    }

    async fn grant_public_read(&self, key: &str) -> Result<(), StoreError> {
        self.inner.simulate_latency().await;
        self.inner.check_fault(FaultPoint::Visibility, key)?;
        match self.inner.objects.get_mut(key) {
            Some(mut object) => {
                object.public = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn stat(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        self.inner.simulate_latency().await;
        self.inner.check_fault(FaultPoint::Stat, key)?;
        self.inner
            .objects
            .get(key)
            .map(|o| ObjectMeta {
                key: key.to_string(),
                generation: Generation::from(o.generation),
                size: o.data.len() as u64,
                updated_at: Some(o.updated_at),
            })
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete_if_generation(
        &self,
        key: &str,
        generation: &Generation,
    ) -> Result<(), StoreError> {
        self.inner.simulate_latency().await;
        self.inner.check_fault(FaultPoint::Delete, key)?;

        let removed = self
            .inner
            .objects
            .remove_if(key, |_, o| Generation::from(o.generation) == *generation);

        match removed {
            Some(_) => Ok(()),
            None if self.inner.objects.contains_key(key) => Err(StoreError::GenerationMismatch {
                key: key.to_string(),
                expected: generation.clone(),
            }),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }
}

struct MemoryObjectWriter {
    inner: Arc<Inner>,
    key: String,
    content_type: String,
    buffer: BytesMut,
}

#[async_trait]
impl ObjectWriter for MemoryObjectWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        self.inner.simulate_latency().await;
        self.inner.check_fault(FaultPoint::Write, &self.key)?;
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> Result<ObjectMeta, StoreError> {
        self.inner.simulate_latency().await;
        self.inner.check_fault(FaultPoint::Finalize, &self.key)?;
        let data = std::mem::take(&mut self.buffer).freeze();
        Ok(self.inner.insert(&self.key, data, &self.content_type))
    }

    async fn abort(self: Box<Self>) {}
}
