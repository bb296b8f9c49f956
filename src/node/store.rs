//! Local Object Store
//!
//! Durable persistence for a single storage node. Objects live at
//! `<data-dir>/<bucket>/<key>`; the write timestamp of each object is kept in
//! a small bincode record at `<data-dir>/.meta/<bucket>/<key>` so Retrieve
//! can report it. Files are staged in `<data-dir>/.tmp/` and renamed into
//! place, record first. The record carries the size and crc32 of the bytes
//! it describes; a record that does not match the bytes on disk (a write
//! interrupted between the two renames) reads as timestamp 0, so the replica
//! looks stale instead of reporting a version that never existed.
//!
//! The store never compares timestamps: whatever it is told to write
//! overwrites the previous version.
//!
//! Reads and writes take a reader/writer lock picked by hashing the object's
//! `(bucket, key)`. With a single stripe this degenerates to one node-wide
//! lock.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

const META_DIR: &str = ".meta";
const STAGING_DIR: &str = ".tmp";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt object metadata: {0}")]
    Meta(#[from] bincode::Error),
}

/// Record persisted next to every object.
#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    timestamp: i64,
    size: u64,
    crc32: u32,
}

impl ObjectMeta {
    fn describes(&self, data: &[u8]) -> bool {
        self.size == data.len() as u64 && self.crc32 == crc32fast::hash(data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    /// Zero when the metadata record is missing or describes other bytes.
    pub timestamp: i64,
}

struct ObjectPaths {
    data: PathBuf,
    meta: PathBuf,
}

pub struct LocalStore {
    root: PathBuf,
    locks: Vec<RwLock<()>>,
}

impl LocalStore {
    pub async fn open(data_dir: impl AsRef<Path>, lock_stripes: usize) -> Result<Self, StoreError> {
        let root = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(root.join(META_DIR)).await?;
        fs::create_dir_all(root.join(STAGING_DIR)).await?;

        let locks = (0..lock_stripes.max(1)).map(|_| RwLock::new(())).collect();
        Ok(Self { root, locks })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_stripes(&self) -> usize {
        self.locks.len()
    }

    /// Writes the object, replacing any previous version.
    pub async fn write(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        timestamp: i64,
    ) -> Result<(), StoreError> {
        let paths = self.paths(bucket, key)?;
        let meta = bincode::serialize(&ObjectMeta {
            timestamp,
            size: data.len() as u64,
            crc32: crc32fast::hash(data),
        })?;

        let _guard = self.lock_for(bucket, key).write().await;
        self.put_file(&paths.meta, &meta).await?;
        self.put_file(&paths.data, data).await?;
        Ok(())
    }

    pub async fn read(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let paths = self.paths(bucket, key)?;
        let _guard = self.lock_for(bucket, key).read().await;

        let data = match fs::read(&paths.data).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found(bucket, key)),
            Err(e) => return Err(e.into()),
        };

        let timestamp = match fs::read(&paths.meta).await {
            Ok(raw) => match bincode::deserialize::<ObjectMeta>(&raw) {
                Ok(meta) if meta.describes(&data) => meta.timestamp,
                Ok(_) => {
                    tracing::warn!("Metadata of {}/{} does not match its bytes", bucket, key);
                    0
                }
                Err(e) => {
                    tracing::warn!("Unreadable metadata for {}/{}: {}", bucket, key, e);
                    0
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(StoredObject { data, timestamp })
    }

    /// Removes the object. A missing object is reported as `NotFound`.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let paths = self.paths(bucket, key)?;
        let _guard = self.lock_for(bucket, key).write().await;

        match fs::remove_file(&paths.data).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found(bucket, key)),
            Err(e) => return Err(e.into()),
        }

        match fs::remove_file(&paths.meta).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_file(&self, target: &Path, contents: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staging = self.root.join(STAGING_DIR).join(Uuid::new_v4().to_string());
        fs::write(&staging, contents).await?;
        if let Err(e) = fs::rename(&staging, target).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn paths(&self, bucket: &str, key: &str) -> Result<ObjectPaths, StoreError> {
        validate(bucket, key)?;
        Ok(ObjectPaths {
            data: self.root.join(bucket).join(key),
            meta: self.root.join(META_DIR).join(bucket).join(key),
        })
    }

    fn lock_for(&self, bucket: &str, key: &str) -> &RwLock<()> {
        let mut hasher = DefaultHasher::new();
        (bucket, key).hash(&mut hasher);
        let stripe = (hasher.finish() % self.locks.len() as u64) as usize;
        &self.locks[stripe]
    }
}

fn not_found(bucket: &str, key: &str) -> StoreError {
    StoreError::NotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

/// Keeps every object inside its bucket directory and buckets clear of the
/// store's internal directories.
fn validate(bucket: &str, key: &str) -> Result<(), StoreError> {
    if bucket.is_empty() || bucket.starts_with('.') || bucket.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidPath(format!("bucket {:?}", bucket)));
    }

    if key.is_empty()
        || key.contains(['\\', '\0'])
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::InvalidPath(format!("key {:?}", key)));
    }

    Ok(())
}
