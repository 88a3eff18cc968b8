//! Test-only helpers: scripted seams and a throwaway git repository.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};

use crate::core::types::BuildStep;
use crate::error::BootstrapError;
use crate::io::builder::{Builder, failure_remedy};
use crate::io::config::BUILDER_CONFIG_FILE;
use crate::io::git::{GitBackend, GitOutput};
use crate::io::prompt::Confirm;

/// Commit timestamp reported by [`ScriptedGit`].
pub const SCRIPTED_TIMESTAMP: i64 = 1_700_000_000;

#[derive(Debug, Default)]
struct GitState {
    head: String,
    objects: BTreeSet<String>,
    remote_objects: BTreeSet<String>,
    modified: Vec<String>,
    staged: Vec<String>,
    untracked: Vec<String>,
    files: Vec<String>,
    fail_fetch: bool,
    fail_checkout: bool,
}

/// In-memory git backend that records every invocation.
#[derive(Debug, Default)]
pub struct ScriptedGit {
    state: RefCell<GitState>,
    calls: RefCell<Vec<Vec<String>>>,
}

impl ScriptedGit {
    /// Repository whose `HEAD` is `head`.
    pub fn at(head: &str) -> Self {
        let git = Self::default();
        {
            let mut state = git.state.borrow_mut();
            state.head = head.to_string();
            state.objects.insert(head.to_string());
        }
        git
    }

    /// Make `revision` available locally.
    pub fn add_object(&self, revision: &str) {
        self.state.borrow_mut().objects.insert(revision.to_string());
    }

    /// Make `revision` available after a successful fetch.
    pub fn add_remote_object(&self, revision: &str) {
        self.state
            .borrow_mut()
            .remote_objects
            .insert(revision.to_string());
    }

    pub fn fail_fetch(&self) {
        self.state.borrow_mut().fail_fetch = true;
    }

    pub fn fail_checkout(&self) {
        self.state.borrow_mut().fail_checkout = true;
    }

    pub fn set_modified(&self, files: &[&str]) {
        self.state.borrow_mut().modified = to_strings(files);
    }

    /// Changes recorded in the index only.
    pub fn set_staged(&self, files: &[&str]) {
        self.state.borrow_mut().staged = to_strings(files);
    }

    pub fn set_untracked(&self, files: &[&str]) {
        self.state.borrow_mut().untracked = to_strings(files);
    }

    /// Tracked files listed by `ls-files`.
    pub fn set_files(&self, files: &[&str]) {
        self.state.borrow_mut().files = to_strings(files);
    }

    pub fn head(&self) -> String {
        self.state.borrow().head.clone()
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Calls that change the repository or talk to a remote.
    pub fn mutating_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call.first().map(String::as_str),
                    Some("fetch" | "checkout" | "clean")
                )
            })
            .collect()
    }

    fn record(&self, args: &[&str]) {
        self.calls
            .borrow_mut()
            .push(args.iter().map(|arg| arg.to_string()).collect());
    }
}

impl GitBackend for ScriptedGit {
    fn capture(&self, args: &[&str]) -> Result<GitOutput> {
        self.record(args);
        let state = self.state.borrow();
        let (success, stdout) = match args {
            ["rev-parse", "HEAD"] => (true, format!("{}\n", state.head)),
            ["cat-file", "-e", revision] => (state.objects.contains(*revision), String::new()),
            ["ls-files", "-z", "-m"] => (true, nul_separated(&state.modified)),
            ["ls-files", "-z", "--others", "--exclude-standard"] => {
                (true, nul_separated(&state.untracked))
            }
            ["status", "--porcelain"] => {
                let mut out = String::new();
                for file in &state.modified {
                    out.push_str(&format!(" M {file}\n"));
                }
                for file in &state.staged {
                    out.push_str(&format!("M  {file}\n"));
                }
                for file in &state.untracked {
                    out.push_str(&format!("?? {file}\n"));
                }
                (true, out)
            }
            ["ls-files", "-z", "--cached", "--others", "--exclude-standard"] => {
                let mut files = state.files.clone();
                files.extend(state.staged.iter().cloned());
                files.extend(state.untracked.iter().cloned());
                (true, nul_separated(&files))
            }
            ["log", ..] => (true, format!("{SCRIPTED_TIMESTAMP}\n")),
            _ => return Err(anyhow!("unscripted git invocation: {}", args.join(" "))),
        };
        Ok(GitOutput {
            success,
            stdout: stdout.into_bytes(),
        })
    }

    fn passthrough(&self, args: &[&str]) -> Result<bool> {
        self.record(args);
        let mut state = self.state.borrow_mut();
        match args.first().copied() {
            Some("fetch") => {
                if state.fail_fetch {
                    return Ok(false);
                }
                let fetched = std::mem::take(&mut state.remote_objects);
                state.objects.extend(fetched);
                Ok(true)
            }
            Some("checkout") => {
                let Some(revision) = args.last() else {
                    return Ok(false);
                };
                if state.fail_checkout || !state.objects.contains(*revision) {
                    return Ok(false);
                }
                state.head = revision.to_string();
                Ok(true)
            }
            Some("clean") => {
                state.untracked.clear();
                Ok(true)
            }
            _ => Err(anyhow!("unscripted git invocation: {}", args.join(" "))),
        }
    }
}

/// Outcome a [`ScriptedBuilder`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedBuild {
    Succeed,
    FailAt(BuildStep),
    ToolMissing,
}

/// Builder that returns a predetermined outcome without spawning anything.
#[derive(Debug)]
pub struct ScriptedBuilder {
    outcome: ScriptedBuild,
    marker: Option<PathBuf>,
    runs: Cell<usize>,
    marker_seen: RefCell<Vec<bool>>,
}

impl ScriptedBuilder {
    pub fn new(outcome: ScriptedBuild) -> Self {
        Self {
            outcome,
            marker: None,
            runs: Cell::new(0),
            marker_seen: RefCell::new(Vec::new()),
        }
    }

    /// Record, on every run, whether the marker at `path` existed.
    pub fn observing_marker(mut self, path: &Path) -> Self {
        self.marker = Some(path.to_path_buf());
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.get()
    }

    pub fn marker_seen(&self) -> Vec<bool> {
        self.marker_seen.borrow().clone()
    }
}

impl Builder for ScriptedBuilder {
    fn clean_and_build(&self, log_dir: &Path) -> Result<(), BootstrapError> {
        self.runs.set(self.runs.get() + 1);
        if let Some(marker) = &self.marker {
            self.marker_seen.borrow_mut().push(marker.exists());
        }
        let step = match self.outcome {
            ScriptedBuild::Succeed => return Ok(()),
            ScriptedBuild::ToolMissing => {
                return Err(BootstrapError::ToolNotFound {
                    tool: "ant".to_string(),
                    hint: None,
                });
            }
            ScriptedBuild::FailAt(step) => step,
        };
        let log_name = match step {
            BuildStep::Clean => "ant-clean.log",
            BuildStep::Build => "ant.log",
        };
        let repo = PathBuf::from("/opt/tool");
        Err(BootstrapError::BuildFailure {
            step,
            remedy: failure_remedy(&repo, true),
            repo,
            log_path: log_dir.join(log_name),
        })
    }
}

/// Confirmation with a fixed answer.
#[derive(Debug)]
pub struct ScriptedConfirm {
    interactive: bool,
    answer: bool,
    asked: Cell<usize>,
}

impl ScriptedConfirm {
    pub fn accepting() -> Self {
        Self::new(true, true)
    }

    pub fn declining() -> Self {
        Self::new(true, false)
    }

    pub fn non_interactive() -> Self {
        Self::new(false, false)
    }

    fn new(interactive: bool, answer: bool) -> Self {
        Self {
            interactive,
            answer,
            asked: Cell::new(0),
        }
    }

    /// Number of questions asked so far.
    pub fn asked(&self) -> usize {
        self.asked.get()
    }
}

impl Confirm for ScriptedConfirm {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn confirm(&self, _question: &str) -> Result<bool> {
        self.asked.set(self.asked.get() + 1);
        Ok(self.answer)
    }
}

/// Whether a usable `git` is on `PATH`.
pub fn git_available() -> bool {
    which::which("git").is_ok()
}

/// Git repository in a temporary directory, with one initial commit.
pub struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["config", "user.email", "bootstrap@example.com"])?;
        repo.git(&["config", "user.name", "Bootstrap Tests"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.write("README", "tool\n")?;
        repo.commit_all("initial")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Commit a builder config that runs `sh` instead of `ant`, and ignore
    /// build output. Each build, but not the clean, appends a line to
    /// `build/count`.
    /// Returns the new `HEAD`.
    pub fn install_shell_builder(&self) -> Result<String> {
        self.write(
            BUILDER_CONFIG_FILE,
            r#"program = "sh"
clean_args = ["-c", "rm -rf build/out"]
build_args = ["-c", "mkdir -p build && echo built > build/out && echo build >> build/count"]
"#,
        )?;
        self.write(".gitignore", "build/\n")?;
        self.commit_all("use shell builder")
    }

    /// Write `contents` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Stage everything and commit. Returns the new `HEAD`.
    pub fn commit_all(&self, message: &str) -> Result<String> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "--quiet", "-m", message])?;
        self.head()
    }

    pub fn head(&self) -> Result<String> {
        Ok(self.git(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    /// Run git in the repository. Returns stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn nul_separated(items: &[String]) -> String {
    items.iter().map(|item| format!("{item}\0")).collect()
}
