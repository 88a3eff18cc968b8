//! Shared deterministic types for the bootstrap.
//!
//! These types define the contracts between the checkout state machine, the
//! identity resolver and the coordinator. They carry no I/O handles.

use std::fmt;

/// Revision the project requires the tool checkout to be at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequirement {
    /// Revision identifier (commit hash, tag, ...).
    pub revision: String,
    /// Branch to fetch from when the revision is not available locally.
    pub branch: Option<String>,
}

impl VersionRequirement {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// Non-fatal outcome of a bootstrap phase.
///
/// Fatal failures travel as `Err(BootstrapError)`, so every phase returns
/// `Result<Flow<T>, BootstrapError>`: continue, restart, or abort.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<T = ()> {
    /// Keep going with the produced value.
    Continue(T),
    /// Stop everything; the hosting launcher must re-execute from scratch.
    Restart(RestartReason),
}

impl<T> Flow<T> {
    pub fn is_restart(&self) -> bool {
        matches!(self, Flow::Restart(_))
    }

    /// Value produced by a phase that did not request a restart.
    pub fn continued(self) -> Option<T> {
        match self {
            Flow::Continue(value) => Some(value),
            Flow::Restart(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Flow<U> {
        match self {
            Flow::Continue(value) => Flow::Continue(f(value)),
            Flow::Restart(reason) => Flow::Restart(reason),
        }
    }
}

/// Why the launcher has to start over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
    /// The checkout was moved to the required revision.
    CheckedOut {
        from: String,
        to: String,
        rebuild: RebuildStatus,
    },
    /// Untracked files were discarded after the user confirmed a cleanup.
    Cleaned,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartReason::CheckedOut { from, to, .. } => {
                write!(f, "tool checkout moved from {from} to {to}")
            }
            RestartReason::Cleaned => f.write_str("untracked files removed from tool checkout"),
        }
    }
}

/// Result of the rebuild attempted right after a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildStatus {
    Succeeded,
    /// The rebuild failed; the message carries the log location and remedy.
    Failed { message: String },
}

/// One of the two external builder invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Clean,
    Build,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::Clean => f.write_str("clean"),
            BuildStep::Build => f.write_str("build"),
        }
    }
}

/// Tri-state dirty override read from the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirtyOverride {
    /// Variable absent or empty.
    #[default]
    Unset,
    /// Variable set to `1`: treat the tree as clean for identity purposes and
    /// report it as dirty to the tool.
    Forced,
    /// Variable set to any other value: only suppresses the commit timestamp.
    Set,
}

impl DirtyOverride {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None | Some("") => DirtyOverride::Unset,
            Some("1") => DirtyOverride::Forced,
            Some(_) => DirtyOverride::Set,
        }
    }

    pub fn is_set(self) -> bool {
        self != DirtyOverride::Unset
    }

    /// Whether a checkout with changes may still yield a clean identity.
    pub fn permits_dirty(self) -> bool {
        self == DirtyOverride::Forced
    }
}

/// Where a fake version string came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeVersionSource {
    Environment,
    File,
}

/// Why the resolver settled on a dirty identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyReason {
    /// The project opted out of version checking.
    VersionCheckDisabled,
    /// The project does not declare a required revision.
    NoRequirement,
    /// The checkout is not a git working tree.
    Unversioned,
    /// Tracked files are modified.
    LocalModifications,
    /// The dirty override is set, so the dirty state is already acknowledged.
    OverrideAcknowledged,
    /// Only the index differs from `HEAD`; cleaning cannot fix that.
    StagedChanges,
    /// Cleanup prompting was disabled through the environment.
    PromptDisabled,
    /// No terminal was available to ask about a cleanup.
    NonInteractive,
    /// The user declined the offered cleanup.
    CleanupDeclined,
}

impl fmt::Display for DirtyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DirtyReason::VersionCheckDisabled => "version check disabled",
            DirtyReason::NoRequirement => "no required revision",
            DirtyReason::Unversioned => "not a git checkout",
            DirtyReason::LocalModifications => "local modifications",
            DirtyReason::OverrideAcknowledged => "dirty override set",
            DirtyReason::StagedChanges => "staged changes",
            DirtyReason::PromptDisabled => "cleanup prompt disabled",
            DirtyReason::NonInteractive => "non-interactive",
            DirtyReason::CleanupDeclined => "cleanup declined",
        };
        f.write_str(text)
    }
}

/// Version identity used to tag builds for distributed caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionIdentity {
    /// Caller-supplied impersonation of another version.
    Fake {
        value: String,
        source: FakeVersionSource,
    },
    /// Unmodified checkout of a known revision; safe as a shared cache key.
    Clean { revision: String },
    /// Content fingerprint of a checkout that could not be proven clean.
    Dirty {
        fingerprint: String,
        reason: DirtyReason,
    },
}

impl VersionIdentity {
    /// The token handed to the tool.
    pub fn as_str(&self) -> &str {
        match self {
            VersionIdentity::Fake { value, .. } => value,
            VersionIdentity::Clean { revision } => revision,
            VersionIdentity::Dirty { fingerprint, .. } => fingerprint,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, VersionIdentity::Clean { .. })
    }

    pub fn dirty_reason(&self) -> Option<DirtyReason> {
        match self {
            VersionIdentity::Dirty { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for VersionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
