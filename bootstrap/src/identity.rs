//! Version identity used to key distributed caches.
//!
//! Precedence, first match wins:
//!
//! 1. `TOOL_FAKE_VERSION` from the environment.
//! 2. `<repo>/.faketoolversion` when present and non-blank.
//! 3. The current revision, when the checkout is clean (or the dirty override
//!    is forced).
//! 4. A content fingerprint, straight away, when the project opted out of
//!    version checks or declares no required revision.
//! 5. A content fingerprint after explaining why the checkout is dirty. When
//!    the only changes are untracked files, a user at a terminal may instead
//!    clean the checkout, which restarts.
//!
//! Nothing is cached: the environment snapshot is fixed, but the checkout can
//! change between calls.

use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::core::types::{DirtyReason, FakeVersionSource, Flow, RestartReason, VersionIdentity};
use crate::error::BootstrapError;
use crate::io::config::{ProjectConfig, Settings, read_fake_version_file};
use crate::io::fingerprint::{fingerprint_files, walk_files};
use crate::io::git::{GitBackend, VcsGateway};
use crate::io::prompt::Confirm;

pub struct VersionIdentityResolver<'a, B, C> {
    gateway: &'a VcsGateway<B>,
    settings: &'a Settings,
    project: &'a ProjectConfig,
    confirm: &'a C,
}

impl<'a, B: GitBackend, C: Confirm> VersionIdentityResolver<'a, B, C> {
    pub fn new(
        gateway: &'a VcsGateway<B>,
        settings: &'a Settings,
        project: &'a ProjectConfig,
        confirm: &'a C,
    ) -> Self {
        Self {
            gateway,
            settings,
            project,
            confirm,
        }
    }

    /// Resolve the identity, or request a restart after a confirmed cleanup.
    #[instrument(skip_all)]
    pub fn resolve(&self) -> Result<Flow<VersionIdentity>, BootstrapError> {
        if let Some(fake) = self.fake_version()? {
            return Ok(Flow::Continue(fake));
        }

        if let Some(revision) = self.clean_revision()? {
            return Ok(Flow::Continue(VersionIdentity::Clean { revision }));
        }

        if self.project.version_check_disabled {
            return self.dirty(DirtyReason::VersionCheckDisabled).map(Flow::Continue);
        }
        if self.project.requirement.is_none() {
            return self.dirty(DirtyReason::NoRequirement).map(Flow::Continue);
        }

        let modified = self.gateway.modified_files()?;
        if !modified.is_empty() {
            warn!(
                "Your tool checkout has local modifications, and therefore builds will not be \
                 able to use a distributed cache. The following files must be either reverted \
                 or committed:\n  {}",
                list_paths(&modified)
            );
            return self.dirty(DirtyReason::LocalModifications).map(Flow::Continue);
        }

        if !self.gateway.is_version_controlled() {
            warn!(
                "Your tool checkout at '{}' is not a git checkout, and therefore builds will \
                 not be able to use a distributed cache.",
                self.gateway.repository().root().display()
            );
            return self.dirty(DirtyReason::Unversioned).map(Flow::Continue);
        }

        warn!(
            "Your tool checkout is dirty, and therefore builds will not be able to use a \
             distributed cache."
        );
        if self.gateway.repository().dirty_override().is_set() {
            return self.dirty(DirtyReason::OverrideAcknowledged).map(Flow::Continue);
        }

        let untracked = self.gateway.untracked_files()?;
        if untracked.is_empty() {
            warn!(
                "Your tool checkout has staged changes that cleaning cannot discard; they must \
                 be either reset or committed."
            );
            return self.dirty(DirtyReason::StagedChanges).map(Flow::Continue);
        }
        warn!(
            "Your tool checkout has untracked files:\n  {}",
            list_paths(&untracked)
        );
        let reason = if !self.settings.prompt_on_dirty {
            DirtyReason::PromptDisabled
        } else if !self.confirm.is_interactive() {
            DirtyReason::NonInteractive
        } else if self
            .confirm
            .confirm("Do you want to clean your tool checkout?")?
        {
            self.gateway.clean(&[])?;
            return Ok(Flow::Restart(RestartReason::Cleaned));
        } else {
            DirtyReason::CleanupDeclined
        };
        self.dirty(reason).map(Flow::Continue)
    }

    fn fake_version(&self) -> Result<Option<VersionIdentity>, BootstrapError> {
        let (value, source) = match &self.settings.fake_version {
            Some(value) => (value.clone(), FakeVersionSource::Environment),
            None => match read_fake_version_file(self.gateway.repository().root())? {
                Some(value) => (value, FakeVersionSource::File),
                None => return Ok(None),
            },
        };
        warn!(
            "Faking tool version {value}, despite your tool checkout not being that version."
        );
        Ok(Some(VersionIdentity::Fake { value, source }))
    }

    /// `HEAD` when it provably describes the checkout.
    fn clean_revision(&self) -> Result<Option<String>, BootstrapError> {
        if !self.gateway.is_version_controlled() {
            return Ok(None);
        }
        let permits_dirty = self.gateway.repository().dirty_override().permits_dirty();
        if !permits_dirty && self.gateway.is_dirty()? {
            return Ok(None);
        }
        Ok(Some(self.gateway.current_revision()?))
    }

    fn dirty(&self, reason: DirtyReason) -> Result<VersionIdentity, BootstrapError> {
        let root = self.gateway.repository().root();
        let revision = self.gateway.current_revision()?;
        let files = if self.gateway.is_version_controlled() {
            self.gateway.tree_files()?
        } else {
            walk_files(root)?
        };
        let fingerprint = fingerprint_files(root, &revision, &files)?;
        info!(
            reason = %reason,
            fingerprint = %fingerprint,
            "using content fingerprint as tool version"
        );
        Ok(VersionIdentity::Dirty {
            fingerprint,
            reason,
        })
    }
}

fn list_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join("\n  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DirtyOverride, VersionRequirement};
    use crate::io::config::FAKE_VERSION_FILE;
    use crate::io::repository::RepositoryHandle;
    use crate::test_support::{ScriptedConfirm, ScriptedGit};

    struct Fixture {
        temp: tempfile::TempDir,
        gateway: VcsGateway<ScriptedGit>,
        project: ProjectConfig,
    }

    fn fixture(git: ScriptedGit, dirty_override: DirtyOverride) -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("README"), "tool").expect("write");
        git.set_files(&["README"]);
        let repo = RepositoryHandle::with_version_control(temp.path(), true, dirty_override);
        let mut project = ProjectConfig::unconstrained(temp.path().join("project"));
        project.requirement = Some(VersionRequirement::new("aaaa"));
        Fixture {
            gateway: VcsGateway::new(repo, git),
            project,
            temp,
        }
    }

    fn resolve(
        fx: &Fixture,
        settings: &Settings,
        confirm: &ScriptedConfirm,
    ) -> Flow<VersionIdentity> {
        VersionIdentityResolver::new(&fx.gateway, settings, &fx.project, confirm)
            .resolve()
            .expect("resolve")
    }

    #[test]
    fn environment_override_beats_clean_checkout() {
        let fx = fixture(ScriptedGit::at("aaaa"), DirtyOverride::Unset);
        std::fs::write(fx.temp.path().join(FAKE_VERSION_FILE), "from-file").expect("write");
        let settings = Settings {
            fake_version: Some("v123".to_string()),
            ..Settings::default()
        };
        let identity = resolve(&fx, &settings, &ScriptedConfirm::declining())
            .continued()
            .expect("identity");
        assert_eq!(identity.as_str(), "v123");
        assert_eq!(
            identity,
            VersionIdentity::Fake {
                value: "v123".to_string(),
                source: FakeVersionSource::Environment
            }
        );
    }

    #[test]
    fn fake_version_file_used_without_environment() {
        let fx = fixture(ScriptedGit::at("aaaa"), DirtyOverride::Unset);
        std::fs::write(fx.temp.path().join(FAKE_VERSION_FILE), " v7 \n").expect("write");
        let identity = resolve(&fx, &Settings::default(), &ScriptedConfirm::declining())
            .continued()
            .expect("identity");
        assert_eq!(
            identity,
            VersionIdentity::Fake {
                value: "v7".to_string(),
                source: FakeVersionSource::File
            }
        );
    }

    #[test]
    fn clean_checkout_returns_revision_without_prompt() {
        let fx = fixture(ScriptedGit::at("aaaa"), DirtyOverride::Unset);
        let confirm = ScriptedConfirm::accepting();
        let identity = resolve(&fx, &Settings::default(), &confirm)
            .continued()
            .expect("identity");
        assert_eq!(
            identity,
            VersionIdentity::Clean {
                revision: "aaaa".to_string()
            }
        );
        assert_eq!(confirm.asked(), 0);
    }

    #[test]
    fn forced_override_treats_dirty_tree_as_clean() {
        let git = ScriptedGit::at("aaaa");
        git.set_modified(&["README"]);
        let fx = fixture(git, DirtyOverride::Forced);
        let identity = resolve(&fx, &Settings::default(), &ScriptedConfirm::declining())
            .continued()
            .expect("identity");
        assert!(identity.is_clean());
    }

    #[test]
    fn local_modifications_non_interactive_fall_back_to_dirty() {
        let git = ScriptedGit::at("aaaa");
        git.set_modified(&["README"]);
        let fx = fixture(git, DirtyOverride::Unset);
        let confirm = ScriptedConfirm::non_interactive();
        let flow = resolve(&fx, &Settings::default(), &confirm);
        assert!(!flow.is_restart());
        let identity = flow.continued().expect("identity");
        assert_eq!(identity.dirty_reason(), Some(DirtyReason::LocalModifications));
        assert_eq!(confirm.asked(), 0);
        assert!(fx.gateway.backend().mutating_calls().is_empty());
    }

    #[test]
    fn untracked_files_prompt_and_restart_on_yes() {
        let git = ScriptedGit::at("aaaa");
        git.set_untracked(&["scratch.txt"]);
        let fx = fixture(git, DirtyOverride::Unset);
        let confirm = ScriptedConfirm::accepting();
        let flow = resolve(&fx, &Settings::default(), &confirm);
        assert_eq!(flow, Flow::Restart(RestartReason::Cleaned));
        assert_eq!(confirm.asked(), 1);
        assert_eq!(
            fx.gateway.backend().mutating_calls(),
            vec![vec!["clean", "-fd"]]
        );
    }

    #[test]
    fn declined_and_non_interactive_are_distinguished() {
        let git = ScriptedGit::at("aaaa");
        git.set_untracked(&["scratch.txt"]);
        let fx = fixture(git, DirtyOverride::Unset);

        let declined = resolve(&fx, &Settings::default(), &ScriptedConfirm::declining())
            .continued()
            .expect("identity");
        let headless = resolve(&fx, &Settings::default(), &ScriptedConfirm::non_interactive())
            .continued()
            .expect("identity");
        assert_eq!(declined.dirty_reason(), Some(DirtyReason::CleanupDeclined));
        assert_eq!(headless.dirty_reason(), Some(DirtyReason::NonInteractive));
        assert_eq!(declined.as_str(), headless.as_str());
    }

    #[test]
    fn prompt_disabled_and_override_skip_prompt() {
        let git = ScriptedGit::at("aaaa");
        git.set_untracked(&["scratch.txt"]);
        let fx = fixture(git, DirtyOverride::Unset);
        let confirm = ScriptedConfirm::accepting();
        let settings = Settings {
            prompt_on_dirty: false,
            ..Settings::default()
        };
        let identity = resolve(&fx, &settings, &confirm)
            .continued()
            .expect("identity");
        assert_eq!(identity.dirty_reason(), Some(DirtyReason::PromptDisabled));

        let git = ScriptedGit::at("aaaa");
        git.set_untracked(&["scratch.txt"]);
        let acknowledged = fixture(git, DirtyOverride::Set);
        let identity = resolve(&acknowledged, &Settings::default(), &confirm)
            .continued()
            .expect("identity");
        assert_eq!(
            identity.dirty_reason(),
            Some(DirtyReason::OverrideAcknowledged)
        );
        assert_eq!(confirm.asked(), 0);
    }

    #[test]
    fn opt_out_and_missing_requirement_skip_diagnostics() {
        let git = ScriptedGit::at("aaaa");
        git.set_untracked(&["scratch.txt"]);
        let mut fx = fixture(git, DirtyOverride::Unset);
        let confirm = ScriptedConfirm::accepting();

        fx.project.version_check_disabled = true;
        let identity = resolve(&fx, &Settings::default(), &confirm)
            .continued()
            .expect("identity");
        assert_eq!(
            identity.dirty_reason(),
            Some(DirtyReason::VersionCheckDisabled)
        );

        fx.project.version_check_disabled = false;
        fx.project.requirement = None;
        let identity = resolve(&fx, &Settings::default(), &confirm)
            .continued()
            .expect("identity");
        assert_eq!(identity.dirty_reason(), Some(DirtyReason::NoRequirement));
        assert_eq!(confirm.asked(), 0);
    }

    #[test]
    fn repeated_resolution_is_deterministic() {
        let git = ScriptedGit::at("aaaa");
        git.set_modified(&["README"]);
        let fx = fixture(git, DirtyOverride::Unset);
        let confirm = ScriptedConfirm::non_interactive();
        let first = resolve(&fx, &Settings::default(), &confirm);
        let second = resolve(&fx, &Settings::default(), &confirm);
        assert_eq!(first, second);
    }

    #[test]
    fn unversioned_checkout_never_prompts() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("README"), "tool").expect("write");
        let repo = RepositoryHandle::with_version_control(temp.path(), false, DirtyOverride::Unset);
        let gateway = VcsGateway::new(repo, ScriptedGit::at("aaaa"));
        let mut project = ProjectConfig::unconstrained(temp.path());
        project.requirement = Some(VersionRequirement::new("aaaa"));
        let confirm = ScriptedConfirm::accepting();

        let settings = Settings::default();
        let identity = VersionIdentityResolver::new(&gateway, &settings, &project, &confirm)
            .resolve()
            .expect("resolve")
            .continued()
            .expect("identity");
        assert_eq!(identity.dirty_reason(), Some(DirtyReason::Unversioned));
        assert_eq!(confirm.asked(), 0);
        assert!(gateway.backend().calls().is_empty());
    }

    #[test]
    fn staged_only_changes_never_offer_cleanup() {
        let git = ScriptedGit::at("aaaa");
        git.set_staged(&["README"]);
        let fx = fixture(git, DirtyOverride::Unset);
        let confirm = ScriptedConfirm::accepting();

        let flow = resolve(&fx, &Settings::default(), &confirm);
        assert!(!flow.is_restart());
        let identity = flow.continued().expect("identity");
        assert_eq!(identity.dirty_reason(), Some(DirtyReason::StagedChanges));
        assert_eq!(confirm.asked(), 0);
        assert!(fx.gateway.backend().mutating_calls().is_empty());
    }
}
