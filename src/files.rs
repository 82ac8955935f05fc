//! Local copies of files that were uploaded through forms
//!
//! Remote File custom fields hold the CRM's attachment id. The store keeps
//! an index from that id to the local copy so a later submission that
//! clears the field can remove both.

use anyhow::{Context, Result};
use log::debug;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const INDEX_FILE: &str = "index.json";

pub trait FileStore: Send + Sync {
    /// Copy a staged upload into storage under the CRM file id
    fn store(&self, file_id: i64, staged: &Path, name: &str) -> Result<PathBuf>;

    /// Local copy of a CRM file, if one was kept
    fn local_path(&self, file_id: i64) -> Option<PathBuf>;

    /// Delete the local copy of a CRM file; returns whether one existed
    fn remove_stored(&self, file_id: i64) -> Result<bool>;

    /// Delete a staged upload that will not be kept
    fn discard(&self, staged: &Path) -> Result<()>;
}

/// File store rooted at a directory, with a JSON index next to the files
#[derive(Debug)]
pub struct LocalFileStore {
    root: PathBuf,
    index: Mutex<BTreeMap<i64, PathBuf>>,
}

impl LocalFileStore {
    /// Open a store, reading its index if one was written before
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            let content = std::fs::read_to_string(&index_path)
                .with_context(|| format!("Failed to read file index: {:?}", index_path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse file index: {:?}", index_path))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<i64, PathBuf>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save_index(&self, index: &BTreeMap<i64, PathBuf>) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create storage directory: {:?}", self.root))?;
        let content = serde_json::to_string_pretty(index).context("Failed to serialize file index")?;
        let index_path = self.root.join(INDEX_FILE);
        std::fs::write(&index_path, content)
            .with_context(|| format!("Failed to write file index: {:?}", index_path))
    }
}

impl FileStore for LocalFileStore {
    fn store(&self, file_id: i64, staged: &Path, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create storage directory: {:?}", self.root))?;
        let target = self.root.join(format!("{}-{}", file_id, name));
        std::fs::copy(staged, &target)
            .with_context(|| format!("Failed to copy {:?} to {:?}", staged, target))?;

        let mut index = self.lock();
        index.insert(file_id, target.clone());
        self.save_index(&index)?;
        debug!("Stored CRM file {} at {:?}", file_id, target);
        Ok(target)
    }

    fn local_path(&self, file_id: i64) -> Option<PathBuf> {
        self.lock().get(&file_id).cloned()
    }

    fn remove_stored(&self, file_id: i64) -> Result<bool> {
        let mut index = self.lock();
        let Some(path) = index.remove(&file_id) else {
            return Ok(false);
        };
        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
        }
        self.save_index(&index)?;
        debug!("Removed local copy of CRM file {}", file_id);
        Ok(true)
    }

    fn discard(&self, staged: &Path) -> Result<()> {
        if staged.exists() {
            std::fs::remove_file(staged).with_context(|| format!("Failed to remove {:?}", staged))?;
            debug!("Discarded staged upload {:?}", staged);
        }
        Ok(())
    }
}
