//! Top-level orchestration of one launcher invocation.
//!
//! [`BootstrapCoordinator::bootstrap`] brings the checkout to the required
//! revision and makes sure a build exists. Once it returns
//! [`Flow::Continue`], version identity, launch properties and resources are
//! available on demand.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::checkout::VersionController;
use crate::core::resources::ResourceLocator;
use crate::core::types::{Flow, RebuildStatus, RestartReason, VersionIdentity};
use crate::error::BootstrapError;
use crate::identity::VersionIdentityResolver;
use crate::io::builder::{Builder, ExternalBuilder};
use crate::io::config::{
    BUILDER_CONFIG_FILE, ProjectConfig, Settings, load_builder_config, load_project_config,
};
use crate::io::git::{Git, GitBackend, VcsGateway};
use crate::io::marker::ArtifactMarker;
use crate::io::prompt::Confirm;
use crate::io::repository::RepositoryHandle;
use crate::launch::LaunchProperties;

/// Everything the coordinator needs, assembled up front.
pub struct Components<B, U> {
    pub gateway: VcsGateway<B>,
    pub builder: U,
    pub marker: ArtifactMarker,
    pub project: ProjectConfig,
    pub settings: Settings,
    pub log_dir: PathBuf,
}

impl Components<Git, ExternalBuilder> {
    /// Read configuration once and wire the real git and builder.
    ///
    /// `env` maps an environment variable name to its value.
    pub fn open(
        repo_root: &Path,
        project_root: &Path,
        log_dir: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, BootstrapError> {
        let settings = Settings::from_lookup(&env)?;
        let repo = RepositoryHandle::open(repo_root, settings.dirty_override);
        let config = load_builder_config(&repo.join(BUILDER_CONFIG_FILE))?;
        let project = load_project_config(project_root)?;
        let marker = ArtifactMarker::in_repository(&repo, &config.marker_path);
        let inherited_opts = env(&config.opts_env);
        let builder = ExternalBuilder::new(&repo, config, settings.max_heap_mb, inherited_opts);
        Ok(Self {
            gateway: VcsGateway::open(repo),
            builder,
            marker,
            project,
            settings,
            log_dir,
        })
    }
}

pub struct BootstrapCoordinator<B, U> {
    gateway: VcsGateway<B>,
    builder: U,
    marker: ArtifactMarker,
    project: ProjectConfig,
    settings: Settings,
    resources: ResourceLocator,
    log_dir: PathBuf,
}

impl<B: GitBackend, U: Builder> BootstrapCoordinator<B, U> {
    /// Ensure the required revision, then ensure a build exists.
    ///
    /// A restart requested by the checkout step is returned without building
    /// again. When the rebuild that followed the checkout succeeded, the marker
    /// is recorded first so the restarted process does not rebuild.
    #[instrument(skip_all, fields(repo = %parts.gateway.repository().root().display()))]
    pub fn bootstrap(parts: Components<B, U>) -> Result<Flow<Self>, BootstrapError> {
        let Components {
            gateway,
            builder,
            marker,
            project,
            settings,
            log_dir,
        } = parts;
        let resources = ResourceLocator::new(gateway.repository().root());
        let coordinator = Self {
            gateway,
            builder,
            marker,
            project,
            settings,
            resources,
            log_dir,
        };

        let controller = VersionController::new(
            &coordinator.gateway,
            &coordinator.builder,
            &coordinator.marker,
            &coordinator.log_dir,
        );
        let flow = controller.ensure_revision(
            coordinator.project.requirement.as_ref(),
            coordinator.project.version_check_disabled,
        )?;
        if let Flow::Restart(reason) = flow {
            if let RestartReason::CheckedOut {
                rebuild: RebuildStatus::Succeeded,
                ..
            } = &reason
            {
                coordinator.marker.record()?;
            }
            info!(reason = %reason, "restart required");
            return Ok(Flow::Restart(reason));
        }

        coordinator.ensure_built()?;
        Ok(Flow::Continue(coordinator))
    }

    /// Build when the marker is missing; record it on success.
    pub fn ensure_built(&self) -> Result<(), BootstrapError> {
        if self.marker.exists() {
            return Ok(());
        }
        warn!(
            "The tool at '{}' does not appear to have been built; building it now.",
            self.gateway.repository().root().display()
        );
        self.builder.clean_and_build(&self.log_dir)?;
        self.marker.record()?;
        info!("tool built");
        Ok(())
    }

    /// Version identity for cache keying. May request a restart after an
    /// interactive cleanup.
    pub fn resolve_version<C: Confirm>(
        &self,
        confirm: &C,
    ) -> Result<Flow<VersionIdentity>, BootstrapError> {
        VersionIdentityResolver::new(&self.gateway, &self.settings, &self.project, confirm)
            .resolve()
    }

    /// Properties to hand to the tool on launch.
    pub fn launch_properties<C: Confirm>(
        &self,
        confirm: &C,
    ) -> Result<Flow<LaunchProperties>, BootstrapError> {
        match self.resolve_version(confirm)? {
            Flow::Continue(identity) => {
                LaunchProperties::collect(&self.gateway, &identity).map(Flow::Continue)
            }
            Flow::Restart(reason) => Ok(Flow::Restart(reason)),
        }
    }

    pub fn locate(&self, name: &str) -> Result<PathBuf, BootstrapError> {
        self.resources.locate(name)
    }

    pub fn gateway(&self) -> &VcsGateway<B> {
        &self.gateway
    }

    pub fn marker(&self) -> &ArtifactMarker {
        &self.marker
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BuildStep, DirtyOverride, VersionRequirement};
    use crate::test_support::{ScriptedBuild, ScriptedBuilder, ScriptedConfirm, ScriptedGit};

    /// Repository state shared by consecutive runs, as across a restart.
    struct Fixture {
        temp: tempfile::TempDir,
        git: ScriptedGit,
        builder: ScriptedBuilder,
        requirement: Option<VersionRequirement>,
    }

    impl Fixture {
        fn new(git: ScriptedGit, build: ScriptedBuild, requirement: Option<&str>) -> Self {
            let temp = tempfile::tempdir().expect("tempdir");
            let marker_path = temp.path().join("build").join("successful-build");
            Self {
                builder: ScriptedBuilder::new(build).observing_marker(&marker_path),
                git,
                requirement: requirement.map(VersionRequirement::new),
                temp,
            }
        }

        fn repo(&self) -> RepositoryHandle {
            RepositoryHandle::with_version_control(self.temp.path(), true, DirtyOverride::Unset)
        }

        fn marker(&self) -> ArtifactMarker {
            ArtifactMarker::in_repository(&self.repo(), "build/successful-build")
        }

        fn parts(&self) -> Components<&ScriptedGit, &ScriptedBuilder> {
            let mut project = ProjectConfig::unconstrained(self.temp.path().join("project"));
            project.requirement = self.requirement.clone();
            Components {
                gateway: VcsGateway::new(self.repo(), &self.git),
                builder: &self.builder,
                marker: self.marker(),
                project,
                settings: Settings::default(),
                log_dir: self.temp.path().join("log"),
            }
        }

        fn bootstrap(
            &self,
        ) -> Result<Flow<BootstrapCoordinator<&ScriptedGit, &ScriptedBuilder>>, BootstrapError>
        {
            BootstrapCoordinator::bootstrap(self.parts())
        }
    }

    fn self_update() -> ScriptedGit {
        let git = ScriptedGit::at("aaaa");
        git.add_object("bbbb");
        git
    }

    #[test]
    fn missing_marker_triggers_build_and_records_it() {
        let fx = Fixture::new(ScriptedGit::at("aaaa"), ScriptedBuild::Succeed, Some("aaaa"));
        let coordinator = fx
            .bootstrap()
            .expect("bootstrap")
            .continued()
            .expect("no restart");
        assert!(coordinator.marker().exists());
        assert_eq!(fx.builder.runs(), 1);
        assert_eq!(fx.builder.marker_seen(), vec![false]);
    }

    #[test]
    fn existing_marker_skips_build() {
        let fx = Fixture::new(ScriptedGit::at("aaaa"), ScriptedBuild::Succeed, None);
        fx.marker().record().expect("seed marker");
        assert!(!fx.bootstrap().expect("bootstrap").is_restart());
        assert_eq!(fx.builder.runs(), 0);
    }

    #[test]
    fn failed_build_is_fatal_and_leaves_no_marker() {
        let fx = Fixture::new(
            ScriptedGit::at("aaaa"),
            ScriptedBuild::FailAt(BuildStep::Build),
            None,
        );
        let err = fx.bootstrap().err().expect("build fails");
        assert!(matches!(
            err,
            BootstrapError::BuildFailure {
                step: BuildStep::Build,
                ..
            }
        ));
        assert!(!fx.marker().exists());
    }

    #[test]
    fn missing_build_tool_is_fatal() {
        let fx = Fixture::new(ScriptedGit::at("aaaa"), ScriptedBuild::ToolMissing, None);
        let err = fx.bootstrap().err().expect("tool missing");
        assert!(matches!(err, BootstrapError::ToolNotFound { .. }));
    }

    #[test]
    fn self_update_builds_once_across_restart() {
        let fx = Fixture::new(self_update(), ScriptedBuild::Succeed, Some("bbbb"));
        fx.marker().record().expect("seed marker");

        match fx.bootstrap().expect("first run") {
            Flow::Restart(RestartReason::CheckedOut { from, to, rebuild }) => {
                assert_eq!(from, "aaaa");
                assert_eq!(to, "bbbb");
                assert_eq!(rebuild, RebuildStatus::Succeeded);
            }
            Flow::Restart(other) => panic!("unexpected restart: {other}"),
            Flow::Continue(_) => panic!("expected a restart"),
        }
        // The stale marker was gone while rebuilding; the fresh one is recorded.
        assert_eq!(fx.builder.marker_seen(), vec![false]);
        assert!(fx.marker().exists());

        let coordinator = fx
            .bootstrap()
            .expect("second run")
            .continued()
            .expect("ready after restart");
        assert!(coordinator.marker().exists());
        assert_eq!(fx.builder.runs(), 1);
    }

    #[test]
    fn missing_tool_after_checkout_restarts_then_fails() {
        let fx = Fixture::new(self_update(), ScriptedBuild::ToolMissing, Some("bbbb"));
        fx.marker().record().expect("seed marker");

        match fx.bootstrap().expect("first run") {
            Flow::Restart(RestartReason::CheckedOut {
                rebuild: RebuildStatus::Failed { message },
                ..
            }) => assert!(message.contains("ant")),
            Flow::Restart(other) => panic!("unexpected restart: {other}"),
            Flow::Continue(_) => panic!("expected a restart"),
        }
        assert!(!fx.marker().exists());
        assert_eq!(fx.git.head(), "bbbb");

        let err = fx.bootstrap().err().expect("second run fails");
        assert!(matches!(err, BootstrapError::ToolNotFound { .. }));
        assert!(!fx.marker().exists());
        assert_eq!(fx.builder.runs(), 2);
    }

    #[test]
    fn on_demand_queries_after_bootstrap() {
        let fx = Fixture::new(ScriptedGit::at("aaaa"), ScriptedBuild::Succeed, Some("aaaa"));
        let coordinator = fx
            .bootstrap()
            .expect("bootstrap")
            .continued()
            .expect("no restart");

        let confirm = ScriptedConfirm::non_interactive();
        let identity = coordinator
            .resolve_version(&confirm)
            .expect("resolve")
            .continued()
            .expect("identity");
        assert_eq!(identity.as_str(), "aaaa");

        let props = coordinator
            .launch_properties(&confirm)
            .expect("props")
            .continued()
            .expect("props");
        assert_eq!(props.commit, "aaaa");
        assert!(!props.dirty);

        assert_eq!(
            coordinator.locate("server").expect("locate"),
            fx.temp.path().join("bin").join("tool")
        );
        assert!(matches!(
            coordinator.locate("nope"),
            Err(BootstrapError::UnknownResource { .. })
        ));
    }
}
