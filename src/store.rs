//! Persistence of generated files.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::grammar::is_safe_path;
use crate::repair::RepairEngine;

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn create_or_update_file(&self, path: &str, content: &str) -> Result<(), StoreError>;

    async fn read_file(&self, path: &str) -> Result<Option<String>, StoreError>;

    /// Every stored path, project-relative, sorted.
    async fn list_files(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<T: FileStore + ?Sized> FileStore for Arc<T> {
    async fn create_or_update_file(&self, path: &str, content: &str) -> Result<(), StoreError> {
        (**self).create_or_update_file(path, content).await
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, StoreError> {
        (**self).read_file(path).await
    }

    async fn list_files(&self) -> Result<Vec<String>, StoreError> {
        (**self).list_files().await
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/*──────────────────────────── filesystem ─────────────────────────────*/

/// Files under a project directory. Content is re-validated through the
/// shared engine before it is written, and every write is atomic.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    engine: Arc<RepairEngine>,
    allowed: Vec<String>,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>, engine: Arc<RepairEngine>, allowed: Vec<String>) -> Self {
        Self {
            root: root.into(),
            engine,
            allowed,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        if !is_safe_path(path, &self.allowed) {
            return Err(StoreError::UnsafePath(path.to_string()));
        }
        Ok(self.root.join(path))
    }
}

/// Write `content` next to `target` under a temporary name. Nothing is
/// visible at `target` until the returned file is persisted; dropping it
/// removes the temporary.
fn stage(target: &Path, content: &str) -> Result<tempfile::NamedTempFile, StoreError> {
    let dir = target.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(io_err(dir))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    tmp.write_all(content.as_bytes()).map_err(io_err(target))?;
    Ok(tmp)
}

fn commit(tmp: tempfile::NamedTempFile, target: &Path) -> Result<(), StoreError> {
    tmp.persist(target).map_err(|e| StoreError::Io {
        path: target.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), StoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(dir)(e)),
    };
    for entry in entries {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name == "node_modules" {
            continue;
        }
        let ty = entry.file_type().map_err(io_err(&path))?;
        if ty.is_dir() {
            walk(root, &path, out)?;
        } else if ty.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                let rel: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.push(rel.join("/"));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl FileStore for FsStore {
    async fn create_or_update_file(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        let validated = self.engine.validate(path, content).content;
        debug!("writing {} ({} bytes)", target.display(), validated.len());
        let staged_for = target.clone();
        let tmp = tokio::task::spawn_blocking(move || stage(&staged_for, &validated))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;
        // the rename runs on this task, so a dropped caller never commits
        commit(tmp, &target)
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, StoreError> {
        let target = self.resolve(path)?;
        match tokio::fs::read_to_string(&target).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&target)(e)),
        }
    }

    async fn list_files(&self) -> Result<Vec<String>, StoreError> {
        let root = self.root.clone();
        let mut files = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            walk(&root, &root, &mut out).map(|_| out)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))??;
        files.sort();
        Ok(files)
    }
}

/*──────────────────────────── memory ─────────────────────────────────*/

/// In-memory store, stores content as given.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<BTreeMap<String, String>>,
    fail_on: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            files: RwLock::new(files.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
            fail_on: None,
        }
    }

    /// Writes to `path` fail with an I/O error.
    pub fn failing_on(mut self, path: impl Into<String>) -> Self {
        self.fail_on = Some(path.into());
        self
    }

    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.files.read().await.clone()
    }

    pub async fn get(&self, path: &str) -> Option<String> {
        self.files.read().await.get(path).cloned()
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn create_or_update_file(&self, path: &str, content: &str) -> Result<(), StoreError> {
        if self.fail_on.as_deref() == Some(path) {
            return Err(StoreError::Io {
                path: path.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "write refused"),
            });
        }
        self.files
            .write()
            .await
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(path).await)
    }

    async fn list_files(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.files.read().await.keys().cloned().collect())
    }
}
