//! Properties the launcher passes to the tool it starts.

use std::fmt;

use crate::core::types::{DirtyOverride, VersionIdentity};
use crate::error::BootstrapError;
use crate::io::git::{GitBackend, VcsGateway};

/// Property prefix understood by the tool.
pub const PROPERTY_PREFIX: &str = "tool.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchProperties {
    /// Resolved version identity.
    pub commit: String,
    /// Seconds since the epoch, or `-1` when unknown.
    pub commit_timestamp: i64,
    /// Whether the tool runs from a checkout with changes.
    pub dirty: bool,
}

impl LaunchProperties {
    /// Gather properties for `identity` from the checkout's current state.
    pub fn collect<B: GitBackend>(
        gateway: &VcsGateway<B>,
        identity: &VersionIdentity,
    ) -> Result<Self, BootstrapError> {
        let forced = gateway.repository().dirty_override() == DirtyOverride::Forced;
        let dirty = forced || gateway.is_dirty()?;
        Ok(Self {
            commit: identity.as_str().to_string(),
            commit_timestamp: gateway.commit_timestamp()?,
            dirty,
        })
    }

    /// `-D` arguments, one per property.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            define("git_commit", &self.commit),
            define("git_commit_timestamp", &self.commit_timestamp),
            define("git_dirty", &u8::from(self.dirty)),
        ]
    }
}

fn define(name: &str, value: &dyn fmt::Display) -> String {
    format!("-D{PROPERTY_PREFIX}{name}={value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::repository::RepositoryHandle;
    use crate::test_support::{SCRIPTED_TIMESTAMP, ScriptedGit};

    fn gateway(dirty_override: DirtyOverride, git: ScriptedGit) -> VcsGateway<ScriptedGit> {
        VcsGateway::new(
            RepositoryHandle::with_version_control("/opt/tool", true, dirty_override),
            git,
        )
    }

    fn clean(revision: &str) -> VersionIdentity {
        VersionIdentity::Clean {
            revision: revision.to_string(),
        }
    }

    #[test]
    fn clean_checkout_properties() {
        let gw = gateway(DirtyOverride::Unset, ScriptedGit::at("aaaa"));
        let props = LaunchProperties::collect(&gw, &clean("aaaa")).expect("collect");
        assert_eq!(
            props.to_args(),
            vec![
                "-Dtool.git_commit=aaaa".to_string(),
                format!("-Dtool.git_commit_timestamp={SCRIPTED_TIMESTAMP}"),
                "-Dtool.git_dirty=0".to_string(),
            ]
        );
    }

    #[test]
    fn untracked_files_mark_dirty() {
        let git = ScriptedGit::at("aaaa");
        git.set_untracked(&["notes.txt"]);
        let props = LaunchProperties::collect(&gateway(DirtyOverride::Unset, git), &clean("aaaa"))
            .expect("collect");
        assert!(props.dirty);
    }

    #[test]
    fn forced_override_reports_dirty_without_timestamp() {
        let gw = gateway(DirtyOverride::Forced, ScriptedGit::at("aaaa"));
        let props = LaunchProperties::collect(&gw, &clean("aaaa")).expect("collect");
        assert!(props.dirty);
        assert_eq!(props.commit_timestamp, -1);
    }

    #[test]
    fn unversioned_checkout_uses_sentinels() {
        let gw = VcsGateway::new(
            RepositoryHandle::with_version_control("/opt/tool", false, DirtyOverride::Unset),
            ScriptedGit::at("aaaa"),
        );
        let identity = VersionIdentity::Dirty {
            fingerprint: "f00d".to_string(),
            reason: crate::core::types::DirtyReason::Unversioned,
        };
        let props = LaunchProperties::collect(&gw, &identity).expect("collect");
        assert_eq!(
            props,
            LaunchProperties {
                commit: "f00d".to_string(),
                commit_timestamp: -1,
                dirty: false,
            }
        );
        assert!(gw.backend().calls().is_empty());
    }
}
