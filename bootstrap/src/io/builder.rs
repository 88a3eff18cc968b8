//! External builder for the tool's own binaries.
//!
//! The [`Builder`] trait decouples the bootstrap from the actual build
//! pipeline (currently `ant clean` followed by `ant`). Tests use scripted
//! builders that return predetermined outcomes without spawning processes.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, instrument, warn};

use crate::core::types::BuildStep;
use crate::error::BootstrapError;
use crate::io::config::BuilderConfig;
use crate::io::process::run_to_log;
use crate::io::repository::RepositoryHandle;

/// Abstraction over the external build pipeline.
pub trait Builder {
    /// Run the clean step, then the build step, logging each under `log_dir`.
    ///
    /// Must not run the build step when the clean step fails. Never touches
    /// the successful-build marker.
    fn clean_and_build(&self, log_dir: &Path) -> Result<(), BootstrapError>;
}

impl<T: Builder + ?Sized> Builder for &T {
    fn clean_and_build(&self, log_dir: &Path) -> Result<(), BootstrapError> {
        (**self).clean_and_build(log_dir)
    }
}

/// Builder that spawns the configured program (default `ant`).
#[derive(Debug, Clone)]
pub struct ExternalBuilder {
    repo_root: PathBuf,
    version_controlled: bool,
    config: BuilderConfig,
    max_heap_mb: u32,
    /// The caller's value of `config.opts_env`, captured at startup.
    inherited_opts: Option<String>,
}

impl ExternalBuilder {
    pub fn new(
        repo: &RepositoryHandle,
        config: BuilderConfig,
        max_heap_mb: u32,
        inherited_opts: Option<String>,
    ) -> Self {
        Self {
            repo_root: repo.root().to_path_buf(),
            version_controlled: repo.is_version_controlled(),
            config,
            max_heap_mb,
            inherited_opts,
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Locate the build program on `PATH`.
    pub fn resolve_program(&self) -> Result<PathBuf, BootstrapError> {
        which::which(&self.config.program).map_err(|err| {
            debug!(program = %self.config.program, err = %err, "build program not found");
            tool_not_found(&self.config.program)
        })
    }

    /// Value for `config.opts_env` handed to the build program.
    pub fn builder_opts(&self) -> String {
        builder_opts(
            self.inherited_opts.as_deref(),
            &self.config.heap_flag,
            self.max_heap_mb,
        )
    }

    fn run_step(
        &self,
        program: &Path,
        step: BuildStep,
        log_dir: &Path,
    ) -> Result<(), BootstrapError> {
        let (args, log_name) = match step {
            BuildStep::Clean => (&self.config.clean_args, &self.config.clean_log),
            BuildStep::Build => (&self.config.build_args, &self.config.build_log),
        };
        let log_path = log_dir.join(log_name);
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.repo_root)
            .env(&self.config.opts_env, self.builder_opts());

        info!(step = %step, log = %log_path.display(), "running external builder");
        let status = run_to_log(cmd, &log_path)?;
        if status.success() {
            return Ok(());
        }
        warn!(step = %step, exit_code = ?status.code(), "external builder failed");
        Err(BootstrapError::BuildFailure {
            step,
            repo: self.repo_root.clone(),
            log_path,
            remedy: failure_remedy(&self.repo_root, self.version_controlled),
        })
    }
}

impl Builder for ExternalBuilder {
    #[instrument(skip_all, fields(program = %self.config.program))]
    fn clean_and_build(&self, log_dir: &Path) -> Result<(), BootstrapError> {
        let program = self.resolve_program()?;
        self.run_step(&program, BuildStep::Clean, log_dir)?;
        self.run_step(&program, BuildStep::Build, log_dir)?;
        Ok(())
    }
}

/// Append the heap ceiling to `inherited` unless the caller already set one.
pub fn builder_opts(inherited: Option<&str>, heap_flag: &str, max_heap_mb: u32) -> String {
    let inherited = inherited.unwrap_or("").trim();
    if !heap_flag.is_empty() && inherited.contains(heap_flag) {
        return inherited.to_string();
    }
    let heap = format!("{heap_flag}{max_heap_mb}m");
    if inherited.is_empty() {
        heap
    } else {
        format!("{inherited} {heap}")
    }
}

/// Command that most likely repairs a broken build.
pub fn failure_remedy(repo_root: &Path, version_controlled: bool) -> String {
    if version_controlled {
        format!("git -C \"{}\" clean -xfd", repo_root.display())
    } else {
        format!("rm -rf \"{}\"/build", repo_root.display())
    }
}

/// `ToolNotFound` with an install hint where one is known.
pub fn tool_not_found(program: &str) -> BootstrapError {
    let hint = (cfg!(target_os = "macos") && program == "ant")
        .then(|| "Try running 'brew install ant'.".to_string());
    BootstrapError::ToolNotFound {
        tool: program.to_string(),
        hint,
    }
}
