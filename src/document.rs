use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

const UTF8_BOM: char = '\u{feff}';

/// JSON document persisted at a fixed path with a default payload.
///
/// All mutation goes through [`DocumentStore::lock`], which serialises
/// read-modify-write cycles within the process. Writes land in a sibling
/// temporary file first and are renamed over the target, so readers never
/// observe a partially written document.
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    default_payload: Value,
    lock: Mutex<()>,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>, default_payload: Value) -> Self {
        Self {
            path: path.into(),
            default_payload,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_payload(&self) -> &Value {
        &self.default_payload
    }

    /// Acquire exclusive access to the document for a multi-step update.
    pub async fn lock(&self) -> DocumentGuard<'_> {
        let guard = self.lock.lock().await;
        DocumentGuard {
            store: self,
            _guard: guard,
        }
    }

    /// Return the current document text, writing the default payload first if
    /// the file does not exist yet.
    pub async fn get_or_create(&self) -> Result<String> {
        self.lock().await.read_or_create().await
    }

    /// Overwrite the document with `value`, returning the text written.
    pub async fn save<T>(&self, value: &T) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        self.lock().await.write(value).await
    }
}

/// Holds the document lock until dropped.
pub struct DocumentGuard<'a> {
    store: &'a DocumentStore,
    _guard: MutexGuard<'a, ()>,
}

impl DocumentGuard<'_> {
    pub fn path(&self) -> &Path {
        &self.store.path
    }

    /// Read the document text. `None` when the file does not exist.
    pub async fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.store.path).await {
            Ok(mut text) => {
                if text.starts_with(UTF8_BOM) {
                    text.remove(0);
                }
                Ok(Some(text))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| {
                format!("failed to read document {}", self.store.path.display())
            }),
        }
    }

    pub async fn read_or_create(&self) -> Result<String> {
        if let Some(text) = self.read().await? {
            return Ok(text);
        }
        debug!(path = %self.store.path.display(), "creating document with default payload");
        self.write(&self.store.default_payload).await
    }

    pub async fn write<T>(&self, value: &T) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let text = serde_json::to_string_pretty(value).context("failed to serialise document")?;
        write_atomic(&self.store.path, text.as_bytes()).await?;
        Ok(text)
    }
}

/// Replace `path` with `bytes` through a uniquely named sibling file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("document path {} has no file name", path.display()))?;
    let staging = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));
    let pending = RemoveOnDrop::file(staging.clone());

    fs::write(&staging, bytes)
        .await
        .with_context(|| format!("failed to write {}", staging.display()))?;
    fs::rename(&staging, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;

    pending.disarm();
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum PendingKind {
    File,
    Directory,
}

/// Deletes a freshly created file or directory unless the operation that
/// created it completes and calls [`RemoveOnDrop::disarm`].
#[derive(Debug)]
pub(crate) struct RemoveOnDrop {
    path: Option<PathBuf>,
    kind: PendingKind,
}

impl RemoveOnDrop {
    pub(crate) fn file(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            kind: PendingKind::File,
        }
    }

    pub(crate) fn directory(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            kind: PendingKind::Directory,
        }
    }

    pub(crate) fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let result = match self.kind {
            PendingKind::File => std::fs::remove_file(&path),
            PendingKind::Directory => std::fs::remove_dir_all(&path),
        };
        match result {
            Ok(()) => debug!(path = %path.display(), "rolled back partial write"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => debug!(path = %path.display(), error = %err, "rollback failed"),
        }
    }
}
