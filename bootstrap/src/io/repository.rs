//! Handle on the tool's own source checkout.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::resources::join_relative;
use crate::core::types::DirtyOverride;

/// Root of the tool checkout plus the facts computed once about it.
///
/// Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    root: PathBuf,
    version_controlled: bool,
    dirty_override: DirtyOverride,
}

impl RepositoryHandle {
    /// Open `root`, detecting whether git can be used on it.
    ///
    /// The checkout counts as version-controlled when it has a `.git`
    /// directory, a `git` executable is on `PATH`, and the platform supports
    /// driving git from here.
    pub fn open(root: impl Into<PathBuf>, dirty_override: DirtyOverride) -> Self {
        let root = root.into();
        let version_controlled = detect_version_control(&root);
        debug!(root = %root.display(), version_controlled, "opened tool repository");
        Self::with_version_control(root, version_controlled, dirty_override)
    }

    /// Construct with an explicit version-control decision.
    pub fn with_version_control(
        root: impl Into<PathBuf>,
        version_controlled: bool,
        dirty_override: DirtyOverride,
    ) -> Self {
        Self {
            root: root.into(),
            version_controlled,
            dirty_override,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_version_controlled(&self) -> bool {
        self.version_controlled
    }

    pub fn dirty_override(&self) -> DirtyOverride {
        self.dirty_override
    }

    /// Join a `/`-separated relative path onto the root.
    pub fn join(&self, relative: &str) -> PathBuf {
        join_relative(&self.root, relative)
    }
}

fn detect_version_control(root: &Path) -> bool {
    root.join(".git").is_dir() && which::which("git").is_ok() && platform_supports_git()
}

/// Git from a Cygwin shell disagrees with native paths, so it is never used.
fn platform_supports_git() -> bool {
    !cfg!(target_os = "cygwin")
}
