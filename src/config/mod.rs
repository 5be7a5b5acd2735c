use std::env;
use std::str::FromStr;
use std::time::Duration;

/// What the coordinator does with still-running workers once a batch has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Keep reading outcomes until every job has reported, then return the first error.
    #[default]
    AwaitDrain,
    /// Return the first error immediately; remaining workers finish in the background.
    Detach,
}

impl FromStr for DrainPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "await" | "await_drain" | "drain" => Ok(Self::AwaitDrain),
            "detach" | "fire_and_forget" => Ok(Self::Detach),
            other => Err(format!("unknown drain policy '{}'", other)),
        }
    }
}

/// Storage adapter selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" | "minio" | "gcs" => Ok(Self::S3),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Configuration for the object store and the bulk transfer pipeline
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Storage adapter: "s3" or "memory" (default: "s3")
    pub backend: StorageBackend,

    /// Bucket every object is written to (default: "media")
    pub bucket: String,

    /// Host used to build public object URLs (default: "storage.googleapis.com")
    pub public_host: String,

    /// S3-compatible endpoint (default: "http://127.0.0.1:9000")
    pub endpoint: String,

    pub access_key: String,
    pub secret_key: String,

    /// Region name passed to the S3 client (default: "us-east-1")
    pub region: String,

    /// Workers per batch; bounds concurrent remote connections (default: 5)
    pub workers: usize,

    /// Deadline covering a whole batch (default: 60s)
    pub batch_deadline: Duration,

    /// Behaviour after the first failed job (default: await drain)
    pub drain_policy: DrainPolicy,

    /// Maximum size of a single uploaded file in bytes (default: 2 MiB)
    pub file_limit: usize,

    /// Maximum request body size in bytes (default: 10 MiB)
    pub body_limit: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            bucket: "media".to_string(),
            public_host: "storage.googleapis.com".to_string(),
            endpoint: "http://127.0.0.1:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            workers: 5,
            batch_deadline: Duration::from_secs(60),
            drain_policy: DrainPolicy::AwaitDrain,
            file_limit: 2 * 1024 * 1024,  // 2 MiB
            body_limit: 10 * 1024 * 1024, // 10 MiB
        }
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

impl TransferConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            backend: parsed("STORAGE_BACKEND").unwrap_or(default.backend),

            bucket: env::var("STORAGE_BUCKET").unwrap_or(default.bucket),

            public_host: env::var("STORAGE_PUBLIC_HOST").unwrap_or(default.public_host),

            endpoint: env::var("STORAGE_ENDPOINT").unwrap_or(default.endpoint),

            access_key: env::var("STORAGE_ACCESS_KEY").unwrap_or(default.access_key),

            secret_key: env::var("STORAGE_SECRET_KEY").unwrap_or(default.secret_key),

            region: env::var("STORAGE_REGION").unwrap_or(default.region),

            workers: parsed::<usize>("TRANSFER_WORKERS")
                .filter(|w| *w > 0)
                .unwrap_or(default.workers),

            batch_deadline: parsed::<u64>("TRANSFER_DEADLINE_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(default.batch_deadline),

            drain_policy: parsed("TRANSFER_DRAIN_POLICY").unwrap_or(default.drain_policy),

            file_limit: parsed("APP_FILE_LIMIT").unwrap_or(default.file_limit),

            body_limit: parsed("APP_BODY_LIMIT").unwrap_or(default.body_limit),
        }
    }

    /// Create config for development (in-memory store, short deadline)
    pub fn development() -> Self {
        Self {
            backend: StorageBackend::Memory,
            bucket: "bucket".to_string(),
            public_host: "storage.example".to_string(),
            batch_deadline: Duration::from_secs(10),
            ..Self::default()
        }
    }
}
