//! Successful-build marker.
//!
//! The marker's existence alone means "the last build succeeded and nothing
//! invalidated it since". Its contents are ignored.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::io::repository::RepositoryHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMarker {
    path: PathBuf,
}

impl ArtifactMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Marker at `relative` under the repository root.
    pub fn in_repository(repo: &RepositoryHandle, relative: &str) -> Self {
        Self::new(repo.join(relative))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the marker. Returns whether one was present.
    pub fn invalidate(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "build marker removed");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => {
                Err(err).with_context(|| format!("remove build marker {}", self.path.display()))
            }
        }
    }

    /// Record a successful build (create or truncate).
    pub fn record(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create marker dir {}", parent.display()))?;
        }
        File::create(&self.path)
            .with_context(|| format!("write build marker {}", self.path.display()))?;
        debug!(path = %self.path.display(), "build marker recorded");
        Ok(())
    }
}
