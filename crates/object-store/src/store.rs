use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::key::ObjectKey;
use crate::listing::{self, ListPage, ListQuery};
use crate::locks::{KeyLocks, WriteGate};

/// Metadata for a stored object, derived entirely from the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: ObjectKey,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl ObjectMeta {
    pub(crate) fn from_fs(key: ObjectKey, metadata: &fs::Metadata) -> Self {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Self {
            key,
            size: metadata.len(),
            last_modified: DateTime::<Utc>::from(modified),
        }
    }

    /// Opaque entity tag built from size and modification time.
    ///
    /// Stable for as long as the file is untouched, changes on every rewrite.
    pub fn etag(&self) -> String {
        let nanos = self
            .last_modified
            .timestamp_nanos_opt()
            .unwrap_or_else(|| self.last_modified.timestamp());
        format!("\"{:x}-{:x}\"", nanos, self.size)
    }
}

/// The vault: a directory tree served as an object namespace.
///
/// Cheap to clone; all clones share the same locks.
#[derive(Debug, Clone)]
pub struct Vault {
    inner: Arc<VaultInner>,
}

#[derive(Debug)]
struct VaultInner {
    root: PathBuf,
    staging: PathBuf,
    gate: WriteGate,
    locks: KeyLocks,
    /// Held shared while a write creates parent directories and renames into
    /// them, exclusively while a delete prunes empty directories.
    layout: parking_lot::RwLock<()>,
}

impl Vault {
    /// Open a vault rooted at `root`.
    ///
    /// `staging` receives in-progress uploads before they are renamed into
    /// place. It must live on the same filesystem as `root` and outside the
    /// object namespace (the `.git` directory is a good home for it).
    pub fn open(root: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let staging = staging.into();
        fs::create_dir_all(&root)?;
        fs::create_dir_all(&staging)?;
        clear_staging(&staging)?;

        info!(root = %root.display(), staging = %staging.display(), "vault opened");

        Ok(Self {
            inner: Arc::new(VaultInner {
                root,
                staging,
                gate: WriteGate::new(),
                locks: KeyLocks::default(),
                layout: parking_lot::RwLock::new(()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// The gate a snapshotting component must hold exclusively.
    pub fn gate(&self) -> &WriteGate {
        &self.inner.gate
    }

    pub fn path_for(&self, key: &ObjectKey) -> PathBuf {
        self.inner.root.join(key.to_relative_path())
    }

    /// Store `data` under `key`, replacing any previous object.
    ///
    /// Returns once the content is fsynced and visible at its final path.
    pub async fn put(&self, key: &ObjectKey, data: Bytes) -> Result<ObjectMeta> {
        let _gate = self.inner.gate.shared().await;
        let _key = self.inner.locks.lock(key).await;

        let inner = self.inner.clone();
        let key = key.clone();
        let meta = tokio::task::spawn_blocking(move || inner.write_object(&key, &data)).await??;

        debug!(key = %meta.key, size = meta.size, "object stored");
        Ok(meta)
    }

    pub async fn get(&self, key: &ObjectKey) -> Result<(ObjectMeta, Bytes)> {
        let path = self.path_for(key);
        let metadata = stat_object(key, &path).await?;
        let data = tokio::fs::read(&path).await.map_err(|e| not_found(key, e))?;
        Ok((ObjectMeta::from_fs(key.clone(), &metadata), Bytes::from(data)))
    }

    pub async fn head(&self, key: &ObjectKey) -> Result<ObjectMeta> {
        let path = self.path_for(key);
        let metadata = stat_object(key, &path).await?;
        Ok(ObjectMeta::from_fs(key.clone(), &metadata))
    }

    /// Remove an object. Returns `false` if it did not exist.
    pub async fn delete(&self, key: &ObjectKey) -> Result<bool> {
        let _gate = self.inner.gate.shared().await;
        let _key = self.inner.locks.lock(key).await;

        let inner = self.inner.clone();
        let key = key.clone();
        let removed = tokio::task::spawn_blocking(move || inner.remove_object(&key)).await??;
        Ok(removed)
    }

    pub async fn list(&self, query: ListQuery) -> Result<ListPage> {
        let root = self.inner.root.clone();
        let page = tokio::task::spawn_blocking(move || listing::list(&root, &query)).await??;
        Ok(page)
    }
}

impl VaultInner {
    fn write_object(&self, key: &ObjectKey, data: &[u8]) -> Result<ObjectMeta> {
        let target = self.root.join(key.to_relative_path());
        if target.is_dir() {
            return Err(StoreError::KeyConflict(key.to_string()));
        }

        let mut staged = tempfile::NamedTempFile::new_in(&self.staging)?;
        staged.write_all(data)?;
        staged.as_file().sync_all()?;

        let _layout = self.layout.read();
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists | io::ErrorKind::NotADirectory => {
                    StoreError::KeyConflict(key.to_string())
                }
                _ => StoreError::Io(e),
            })?;
        }
        let file = staged.persist(&target).map_err(|e| e.error)?;
        let metadata = file.metadata()?;

        Ok(ObjectMeta::from_fs(key.clone(), &metadata))
    }

    fn remove_object(&self, key: &ObjectKey) -> Result<bool> {
        let target = self.root.join(key.to_relative_path());
        if target.is_dir() {
            return Ok(false);
        }
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let _layout = self.layout.write();
        let mut dir = target.parent();
        while let Some(current) = dir {
            if current == self.root {
                break;
            }
            // stops at the first directory that still has entries
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }

        debug!(key = %key, "object removed");
        Ok(true)
    }
}

async fn stat_object(key: &ObjectKey, path: &Path) -> Result<fs::Metadata> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| not_found(key, e))?;
    if !metadata.is_file() {
        return Err(StoreError::NotFound(key.to_string()));
    }
    Ok(metadata)
}

fn not_found(key: &ObjectKey, e: io::Error) -> StoreError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => {
            StoreError::NotFound(key.to_string())
        }
        _ => StoreError::Io(e),
    }
}

/// Remove uploads left behind by a crash.
fn clear_staging(staging: &Path) -> io::Result<()> {
    for entry in fs::read_dir(staging)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
