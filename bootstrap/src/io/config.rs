//! Configuration read once at startup.
//!
//! - [`Settings`]: environment variables.
//! - [`BuilderConfig`]: optional `<repo>/.bootstrap.toml` describing the
//!   external builder.
//! - [`ProjectConfig`]: the project's version requirement and opt-out files.
//!
//! Components receive these structs through their constructors; nothing below
//! the binary reads the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{DirtyOverride, VersionRequirement};

/// Fake version string that wins over everything else.
pub const FAKE_VERSION_ENV: &str = "TOOL_FAKE_VERSION";
/// Dirty override: unset, `1` (forced) or any other value.
pub const REPOSITORY_DIRTY_ENV: &str = "TOOL_REPOSITORY_DIRTY";
/// Set to `NO` to never offer a cleanup of a dirty checkout.
pub const CLEAN_REPO_IF_DIRTY_ENV: &str = "TOOL_CLEAN_REPO_IF_DIRTY";
/// Heap ceiling (MiB) handed to the external builder.
pub const BUILD_MAX_HEAP_ENV: &str = "TOOL_BUILD_MAX_HEAP_MB";

pub const DEFAULT_MAX_HEAP_MB: u32 = 1000;

/// Builder configuration file, relative to the repository root.
pub const BUILDER_CONFIG_FILE: &str = ".bootstrap.toml";
/// Project file holding the required revision and optional branch.
pub const VERSION_FILE: &str = ".toolversion";
/// Project file whose presence disables self-update.
pub const NO_CHECK_FILE: &str = ".notoolcheck";
/// Repository file holding a persisted fake version.
pub const FAKE_VERSION_FILE: &str = ".faketoolversion";

/// Environment-sourced settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub fake_version: Option<String>,
    pub dirty_override: DirtyOverride,
    /// False when the cleanup prompt was disabled.
    pub prompt_on_dirty: bool,
    pub max_heap_mb: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fake_version: None,
            dirty_override: DirtyOverride::Unset,
            prompt_on_dirty: true,
            max_heap_mb: DEFAULT_MAX_HEAP_MB,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let fake_version = lookup(FAKE_VERSION_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let dirty_override = DirtyOverride::parse(lookup(REPOSITORY_DIRTY_ENV).as_deref());
        let prompt_on_dirty = lookup(CLEAN_REPO_IF_DIRTY_ENV).as_deref() != Some("NO");
        let max_heap_mb = match lookup(BUILD_MAX_HEAP_ENV) {
            Some(raw) => {
                let parsed: u32 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("parse {BUILD_MAX_HEAP_ENV}='{raw}'"))?;
                if parsed == 0 {
                    return Err(anyhow!("{BUILD_MAX_HEAP_ENV} must be > 0"));
                }
                parsed
            }
            None => DEFAULT_MAX_HEAP_MB,
        };
        Ok(Self {
            fake_version,
            dirty_override,
            prompt_on_dirty,
            max_heap_mb,
        })
    }
}

/// External builder configuration (TOML).
///
/// Missing fields default to the stock `ant` pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuilderConfig {
    /// Program looked up on `PATH`.
    pub program: String,
    /// Arguments for the clean step.
    pub clean_args: Vec<String>,
    /// Arguments for the build step.
    pub build_args: Vec<String>,
    /// Environment variable carrying the builder's JVM options.
    pub opts_env: String,
    /// Option prefix for the heap ceiling; appended only when absent.
    pub heap_flag: String,
    /// Log file for the clean step, inside the log directory.
    pub clean_log: String,
    /// Log file for the build step, inside the log directory.
    pub build_log: String,
    /// Successful-build marker, relative to the repository root.
    pub marker_path: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            program: "ant".to_string(),
            clean_args: vec!["clean".to_string()],
            build_args: Vec::new(),
            opts_env: "ANT_OPTS".to_string(),
            heap_flag: "-Xmx".to_string(),
            clean_log: "ant-clean.log".to_string(),
            build_log: "ant.log".to_string(),
            marker_path: "build/successful-build".to_string(),
        }
    }
}

impl BuilderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(anyhow!("program must be non-empty"));
        }
        if self.opts_env.trim().is_empty() {
            return Err(anyhow!("opts_env must be non-empty"));
        }
        if self.heap_flag.trim().is_empty() {
            return Err(anyhow!("heap_flag must be non-empty"));
        }
        for (field, value) in [
            ("clean_log", &self.clean_log),
            ("build_log", &self.build_log),
            ("marker_path", &self.marker_path),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{field} must be non-empty"));
            }
        }
        if self.clean_log == self.build_log {
            return Err(anyhow!("clean_log and build_log must differ"));
        }
        Ok(())
    }
}

/// Load the builder config from a TOML file.
///
/// If the file is missing, returns `BuilderConfig::default()`.
pub fn load_builder_config(path: &Path) -> Result<BuilderConfig> {
    if !path.exists() {
        let cfg = BuilderConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BuilderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Project-side inputs to the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub root: PathBuf,
    /// `None` means no check was requested.
    pub requirement: Option<VersionRequirement>,
    /// Local opt-out of self-update.
    pub version_check_disabled: bool,
}

impl ProjectConfig {
    /// A project with no requirement and no opt-out.
    pub fn unconstrained(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            requirement: None,
            version_check_disabled: false,
        }
    }
}

/// Load the project's version requirement and opt-out marker.
pub fn load_project_config(root: &Path) -> Result<ProjectConfig> {
    let version_path = root.join(VERSION_FILE);
    let requirement = if version_path.is_file() {
        let contents = fs::read_to_string(&version_path)
            .with_context(|| format!("read {}", version_path.display()))?;
        parse_version_file(&contents)
            .with_context(|| format!("parse {}", version_path.display()))?
    } else {
        None
    };
    let version_check_disabled = root.join(NO_CHECK_FILE).exists();
    debug!(
        root = %root.display(),
        requirement = ?requirement,
        version_check_disabled,
        "project config loaded"
    );
    Ok(ProjectConfig {
        root: root.to_path_buf(),
        requirement,
        version_check_disabled,
    })
}

/// Parse a version file: first non-empty line is the revision, the second
/// (optional) is the branch.
///
/// Both end up as git arguments, so neither may start with `-`.
pub fn parse_version_file(contents: &str) -> Result<Option<VersionRequirement>> {
    let mut lines = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());
    let Some(revision) = lines.next() else {
        return Ok(None);
    };
    reject_option_like("revision", revision)?;
    let requirement = VersionRequirement::new(revision);
    Ok(Some(match lines.next() {
        Some(branch) => {
            reject_option_like("branch", branch)?;
            requirement.with_branch(branch)
        }
        None => requirement,
    }))
}

fn reject_option_like(field: &str, value: &str) -> Result<()> {
    if value.starts_with('-') {
        return Err(anyhow!("{field} '{value}' must not start with '-'"));
    }
    Ok(())
}

/// Read the persisted fake version at `<repo>/.faketoolversion`.
///
/// Returns `None` when the file is missing or blank.
pub fn read_fake_version_file(repo_root: &Path) -> Result<Option<String>> {
    let path = repo_root.join(FAKE_VERSION_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let trimmed = contents.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}
