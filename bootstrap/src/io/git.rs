//! Git gateway for the tool checkout.
//!
//! [`GitBackend`] is the subprocess seam: it runs `git` with raw arguments and
//! reports exit status and output. [`VcsGateway`] turns that into typed
//! queries and mutations, and degrades every one of them to a fixed sentinel
//! when the checkout is not version-controlled, without spawning anything.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::error::BootstrapError;
use crate::io::process::{capture, run_passthrough};
use crate::io::repository::RepositoryHandle;

/// Revision reported when the checkout is not version-controlled.
pub const NO_REVISION: &str = "N/A";
/// Commit timestamp reported when it is unknown or overridden.
pub const NO_TIMESTAMP: i64 = -1;

/// Output of a captured git invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
}

/// Abstraction over running `git` inside the repository root.
pub trait GitBackend {
    /// Run git and capture stdout. A non-zero exit is reported, not an error.
    fn capture(&self, args: &[&str]) -> Result<GitOutput>;

    /// Run git with output forwarded to the user. Returns whether it succeeded.
    fn passthrough(&self, args: &[&str]) -> Result<bool>;
}

impl<T: GitBackend + ?Sized> GitBackend for &T {
    fn capture(&self, args: &[&str]) -> Result<GitOutput> {
        (**self).capture(args)
    }

    fn passthrough(&self, args: &[&str]) -> Result<bool> {
        (**self).passthrough(args)
    }
}

/// Backend that spawns the `git` executable.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        cmd
    }
}

impl GitBackend for Git {
    fn capture(&self, args: &[&str]) -> Result<GitOutput> {
        debug!(args = %args.join(" "), "git");
        let output = capture(self.command(args))?;
        if !output.status.success() {
            debug!(
                args = %args.join(" "),
                stderr = %output.stderr.trim(),
                "git exited unsuccessfully"
            );
        }
        Ok(GitOutput {
            success: output.status.success(),
            stdout: output.stdout,
        })
    }

    fn passthrough(&self, args: &[&str]) -> Result<bool> {
        debug!(args = %args.join(" "), "git (passthrough)");
        Ok(run_passthrough(self.command(args))?.success())
    }
}

/// Typed git queries and mutations scoped to one repository.
#[derive(Debug, Clone)]
pub struct VcsGateway<B> {
    repo: RepositoryHandle,
    backend: B,
}

impl VcsGateway<Git> {
    /// Gateway backed by the real `git` executable.
    pub fn open(repo: RepositoryHandle) -> Self {
        let backend = Git::new(repo.root());
        Self::new(repo, backend)
    }
}

impl<B: GitBackend> VcsGateway<B> {
    pub fn new(repo: RepositoryHandle, backend: B) -> Self {
        Self { repo, backend }
    }

    pub fn repository(&self) -> &RepositoryHandle {
        &self.repo
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_version_controlled(&self) -> bool {
        self.repo.is_version_controlled()
    }

    /// Current `HEAD` revision, or [`NO_REVISION`].
    pub fn current_revision(&self) -> Result<String> {
        if !self.is_version_controlled() {
            return Ok(NO_REVISION.to_string());
        }
        let out = self.checked_text(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Whether `revision` resolves in the local object store. No network access.
    pub fn revision_exists(&self, revision: &str) -> Result<bool> {
        if !self.is_version_controlled() {
            return Ok(false);
        }
        Ok(self.backend.capture(&["cat-file", "-e", revision])?.success)
    }

    /// Tracked files with unstaged modifications or deletions.
    pub fn modified_files(&self) -> Result<Vec<PathBuf>> {
        if !self.is_version_controlled() {
            return Ok(Vec::new());
        }
        let out = self.checked(&["ls-files", "-z", "-m"])?;
        Ok(nul_separated_paths(&out))
    }

    /// Untracked files that are not ignored; exactly what `clean` removes.
    pub fn untracked_files(&self) -> Result<Vec<PathBuf>> {
        if !self.is_version_controlled() {
            return Ok(Vec::new());
        }
        let out = self.checked(&["ls-files", "-z", "--others", "--exclude-standard"])?;
        Ok(nul_separated_paths(&out))
    }

    pub fn has_local_modifications(&self) -> Result<bool> {
        Ok(!self.modified_files()?.is_empty())
    }

    /// Whether the working tree differs from `HEAD` in any way, untracked
    /// files included.
    pub fn is_dirty(&self) -> Result<bool> {
        if !self.is_version_controlled() {
            return Ok(false);
        }
        let out = self.checked_text(&["status", "--porcelain"])?;
        Ok(!out.trim().is_empty())
    }

    /// Tracked files plus untracked files that are not ignored.
    pub fn tree_files(&self) -> Result<Vec<PathBuf>> {
        if !self.is_version_controlled() {
            return Ok(Vec::new());
        }
        let out = self.checked(&[
            "ls-files",
            "-z",
            "--cached",
            "--others",
            "--exclude-standard",
        ])?;
        let mut files = nul_separated_paths(&out);
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Fetch every remote, or only `branch` from `origin`.
    #[instrument(skip_all, fields(branch = ?branch))]
    pub fn fetch(&self, branch: Option<&str>, revision: &str) -> Result<(), BootstrapError> {
        if !self.is_version_controlled() {
            return Ok(());
        }
        let (args, remote) = match branch {
            Some(branch) => (vec!["fetch", "origin", branch], format!("origin {branch}")),
            None => (vec!["fetch", "--all"], "all remotes".to_string()),
        };
        if self.backend.passthrough(&args)? {
            return Ok(());
        }
        warn!(remote = %remote, "git fetch failed");
        Err(BootstrapError::Fetch {
            revision: revision.to_string(),
            remote,
        })
    }

    /// Check out `revision` exactly (detached, no merge).
    #[instrument(skip_all, fields(revision))]
    pub fn checkout(&self, revision: &str) -> Result<(), BootstrapError> {
        if !self.is_version_controlled() {
            return Ok(());
        }
        if self
            .backend
            .passthrough(&["checkout", "--quiet", revision])?
        {
            return Ok(());
        }
        warn!(revision, "git checkout failed");
        Err(BootstrapError::Checkout {
            repo: self.repo.root().to_path_buf(),
            revision: revision.to_string(),
        })
    }

    /// Discard untracked files, everywhere or under `paths`.
    ///
    /// Only called after the user confirmed it.
    #[instrument(skip_all)]
    pub fn clean(&self, paths: &[&str]) -> Result<(), BootstrapError> {
        if !self.is_version_controlled() {
            return Ok(());
        }
        let mut args = vec!["clean", "-fd"];
        if !paths.is_empty() {
            args.push("--");
            args.extend_from_slice(paths);
        }
        if self.backend.passthrough(&args)? {
            return Ok(());
        }
        Err(anyhow!(
            "git clean failed in '{}'",
            self.repo.root().display()
        )
        .into())
    }

    /// Commit time of `HEAD` in seconds since the epoch, or [`NO_TIMESTAMP`]
    /// when the dirty override is set or the checkout is not version-controlled.
    pub fn commit_timestamp(&self) -> Result<i64> {
        if self.repo.dirty_override().is_set() || !self.is_version_controlled() {
            return Ok(NO_TIMESTAMP);
        }
        let out = self.checked_text(&["log", "-1", "--format=%ct", "HEAD"])?;
        out.trim()
            .parse()
            .with_context(|| format!("parse commit timestamp '{}'", out.trim()))
    }

    fn checked_text(&self, args: &[&str]) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.checked(args)?).into_owned())
    }

    fn checked(&self, args: &[&str]) -> Result<Vec<u8>> {
        let out = self.backend.capture(args)?;
        if !out.success {
            return Err(anyhow!(
                "git {} failed in '{}'",
                args.join(" "),
                self.repo.root().display()
            ));
        }
        Ok(out.stdout)
    }
}

/// Paths from `-z` output: verbatim, never C-quoted.
fn nul_separated_paths(out: &[u8]) -> Vec<PathBuf> {
    out.split(|byte| *byte == 0)
        .filter(|entry| !entry.is_empty())
        .map(path_from_bytes)
        .collect()
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

/// Git for Windows writes paths as UTF-8.
#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DirtyOverride;
    use crate::test_support::ScriptedGit;

    fn gateway(version_controlled: bool, git: ScriptedGit) -> VcsGateway<ScriptedGit> {
        let repo = RepositoryHandle::with_version_control(
            "/opt/tool",
            version_controlled,
            DirtyOverride::Unset,
        );
        VcsGateway::new(repo, git)
    }

    #[test]
    fn unversioned_queries_return_sentinels_without_running_git() {
        let gw = gateway(false, ScriptedGit::at("aaaa"));
        assert_eq!(gw.current_revision().expect("rev"), NO_REVISION);
        assert!(!gw.revision_exists("aaaa").expect("exists"));
        assert!(!gw.has_local_modifications().expect("mods"));
        assert!(!gw.is_dirty().expect("dirty"));
        assert_eq!(gw.commit_timestamp().expect("ts"), NO_TIMESTAMP);
        assert!(gw.tree_files().expect("files").is_empty());
        gw.fetch(Some("main"), "bbbb").expect("fetch");
        gw.checkout("bbbb").expect("checkout");
        gw.clean(&[]).expect("clean");
        assert!(gw.backend().calls().is_empty());
    }

    #[test]
    fn fetch_uses_branch_when_given() {
        let gw = gateway(true, ScriptedGit::at("aaaa"));
        gw.fetch(Some("stable"), "bbbb").expect("fetch");
        gw.fetch(None, "bbbb").expect("fetch");
        assert_eq!(
            gw.backend().calls(),
            vec![
                vec!["fetch", "origin", "stable"],
                vec!["fetch", "--all"],
            ]
        );
    }

    #[test]
    fn failed_fetch_is_typed() {
        let git = ScriptedGit::at("aaaa");
        git.fail_fetch();
        let err = gateway(true, git).fetch(None, "bbbb").expect_err("fetch fails");
        assert!(matches!(
            err,
            BootstrapError::Fetch { ref revision, .. } if revision == "bbbb"
        ));
    }

    #[test]
    fn failed_checkout_is_typed() {
        let gw = gateway(true, ScriptedGit::at("aaaa"));
        let err = gw.checkout("missing").expect_err("unknown revision");
        assert!(matches!(err, BootstrapError::Checkout { .. }));
        assert_eq!(gw.current_revision().expect("rev"), "aaaa");
    }

    #[test]
    fn missing_revision_is_false_not_error() {
        let gw = gateway(true, ScriptedGit::at("aaaa"));
        assert!(gw.revision_exists("aaaa").expect("exists"));
        assert!(!gw.revision_exists("zzzz").expect("exists"));
    }

    #[test]
    fn dirty_override_hides_timestamp() {
        let git = ScriptedGit::at("aaaa");
        let repo = RepositoryHandle::with_version_control("/opt/tool", true, DirtyOverride::Set);
        let gw = VcsGateway::new(repo, git);
        assert_eq!(gw.commit_timestamp().expect("ts"), NO_TIMESTAMP);
        assert!(gw.backend().calls().is_empty());
    }

    #[test]
    fn timestamp_and_modifications_parse_output() {
        let git = ScriptedGit::at("aaaa");
        git.set_modified(&["src/lib.rs"]);
        let gw = gateway(true, git);
        assert_eq!(
            gw.commit_timestamp().expect("ts"),
            crate::test_support::SCRIPTED_TIMESTAMP
        );
        assert_eq!(
            gw.modified_files().expect("mods"),
            vec![PathBuf::from("src/lib.rs")]
        );
        assert!(gw.is_dirty().expect("dirty"));
    }

    #[test]
    fn nul_separated_paths_are_taken_verbatim() {
        let out = "caf\u{e9}.txt\0dir/with space.txt\0\"quoted\".txt\0".as_bytes();
        assert_eq!(
            nul_separated_paths(out),
            vec![
                PathBuf::from("caf\u{e9}.txt"),
                PathBuf::from("dir/with space.txt"),
                PathBuf::from("\"quoted\".txt"),
            ]
        );
    }

    #[test]
    fn untracked_files_are_listed_separately() {
        let git = ScriptedGit::at("aaaa");
        git.set_modified(&["src/lib.rs"]);
        git.set_untracked(&["notes.txt"]);
        let gw = gateway(true, git);
        assert_eq!(
            gw.untracked_files().expect("untracked"),
            vec![PathBuf::from("notes.txt")]
        );
    }
}
