//! Asset-library source
//!
//! The embedding application hands the pipeline opaque asset handles; a
//! JSON manifest maps each handle to a file on disk. Resolution happens at
//! setup time, after which the source behaves exactly like a file source.

use super::{FileSource, SourceError, SourceEvent, VideoSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Opaque reference to a video in the asset library
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetHandle(String);

impl AssetHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Handle → path mapping owned by the embedding application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetLibrary {
    entries: HashMap<String, PathBuf>,
}

impl AssetLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the manifest from a JSON file
    pub fn load(manifest: &Path) -> Result<Self, SourceError> {
        let raw = std::fs::read_to_string(manifest).map_err(|e| {
            SourceError::ConfigInvalid(format!("cannot read asset manifest: {e}"))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| SourceError::ConfigInvalid(format!("invalid asset manifest: {e}")))
    }

    pub fn insert(&mut self, handle: AssetHandle, path: impl Into<PathBuf>) {
        self.entries.insert(handle.0, path.into());
    }

    /// Resolve a handle to its backing file
    pub fn resolve(&self, handle: &AssetHandle) -> Option<&Path> {
        self.entries.get(&handle.0).map(PathBuf::as_path)
    }
}

/// Video source for a library asset: a file source behind a handle
pub struct LibraryAssetSource {
    handle: AssetHandle,
    inner: FileSource,
}

impl LibraryAssetSource {
    pub fn new(handle: AssetHandle, library: &AssetLibrary) -> Result<Self, SourceError> {
        let path = library.resolve(&handle).ok_or_else(|| {
            SourceError::ConfigInvalid(format!("unknown asset handle: {}", handle.as_str()))
        })?;
        Ok(Self {
            inner: FileSource::new(path),
            handle,
        })
    }
}

#[async_trait]
impl VideoSource for LibraryAssetSource {
    async fn configure(&mut self, events: mpsc::Sender<SourceEvent>) -> Result<(), SourceError> {
        tracing::debug!("configuring library asset {}", self.handle.as_str());
        self.inner.configure(events).await
    }

    fn start(&mut self) -> Result<(), SourceError> {
        self.inner.start()
    }

    fn stop(&mut self) {
        self.inner.stop()
    }
}
