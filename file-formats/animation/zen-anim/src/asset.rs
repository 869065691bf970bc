//! Read-only asset store used to resolve clip and script names to bytes
//!
//! Asset names are path-like strings such as `HUMANS-S_RUN.MAN`. Lookups are
//! ASCII case-insensitive, matching the behaviour of the game's virtual file
//! index.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AnimError, Result};

/// Trait for resolving asset names to their contents
pub trait AssetStore: Send + Sync {
    /// Check whether an asset with this name exists
    fn exists(&self, name: &str) -> bool;

    /// Load the full contents of an asset
    fn open(&self, name: &str) -> Result<Vec<u8>>;
}

/// Build the asset name of a clip owned by a model: `MODEL-CLIP.EXT`
pub fn clip_asset_name(model: &str, clip: &str, extension: &str) -> String {
    format!("{model}-{clip}.{extension}")
}

/// An asset store backed by a flat directory on disk
#[derive(Debug)]
pub struct DirectoryStore {
    /// Base path of the directory
    root: PathBuf,
    /// Upper-cased file name to real path
    index: HashMap<String, PathBuf>,
}

impl DirectoryStore {
    /// Index every regular file directly inside `root`
    pub fn open_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut index = HashMap::new();

        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_ascii_uppercase) else {
                log::warn!("Skipping non UTF-8 file name in {}", root.display());
                continue;
            };
            index.insert(name, entry.path());
        }

        log::debug!("Indexed {} assets in {}", index.len(), root.display());
        Ok(Self { root, index })
    }

    /// Base path of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of indexed assets
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the directory held no assets
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Iterate over the upper-cased names of all indexed assets
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }
}

impl AssetStore for DirectoryStore {
    fn exists(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_uppercase())
    }

    fn open(&self, name: &str) -> Result<Vec<u8>> {
        let path = self
            .index
            .get(&name.to_ascii_uppercase())
            .ok_or_else(|| AnimError::AssetNotFound(name.to_string()))?;
        Ok(fs::read(path)?)
    }
}

/// An in-memory asset store, mostly useful for tools and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an asset
    pub fn insert<S: AsRef<str>>(&mut self, name: S, data: Vec<u8>) {
        self.files.insert(name.as_ref().to_ascii_uppercase(), data);
    }

    /// Remove an asset
    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.files.remove(&name.to_ascii_uppercase())
    }
}

impl AssetStore for MemoryStore {
    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(&name.to_ascii_uppercase())
    }

    fn open(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .get(&name.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| AnimError::AssetNotFound(name.to_string()))
    }
}
