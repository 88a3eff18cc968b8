//! Helpers for running blocking child processes.
//!
//! Every git and builder invocation goes through one of these so spawn
//! failures carry the same context and every child gets a closed stdin.

use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, error, instrument};

/// Captured child process output.
///
/// Stdout stays raw: git emits paths that need not be UTF-8.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Run `cmd` to completion, keeping stdout raw and stderr as lossy UTF-8.
pub fn capture(mut cmd: Command) -> Result<CapturedOutput> {
    cmd.stdin(Stdio::null());
    let output = cmd
        .output()
        .with_context(|| format!("spawn {}", describe(&cmd)))?;
    debug!(exit_code = ?output.status.code(), "command finished");
    Ok(CapturedOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `cmd` with its stdout forwarded to our stderr.
///
/// Used for long-running git operations whose progress the user should see
/// without polluting our stdout.
pub fn run_passthrough(mut cmd: Command) -> Result<ExitStatus> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(std::io::stderr()))
        .stderr(Stdio::inherit());
    let status = cmd
        .status()
        .with_context(|| format!("spawn {}", describe(&cmd)))?;
    debug!(exit_code = ?status.code(), "command finished");
    Ok(status)
}

/// Run `cmd` with stdout and stderr written to `log_path`.
///
/// The log file is created or truncated, never appended to.
#[instrument(skip_all, fields(log = %log_path.display()))]
pub fn run_to_log(mut cmd: Command, log_path: &Path) -> Result<ExitStatus> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let log = File::create(log_path)
        .with_context(|| format!("create log file {}", log_path.display()))?;
    let log_err = log
        .try_clone()
        .with_context(|| format!("clone log handle {}", log_path.display()))?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));

    debug!(command = %describe(&cmd), "spawning child process");
    let status = match cmd.status() {
        Ok(status) => status,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {}", describe(&cmd)));
        }
    };
    debug!(exit_code = ?status.code(), "command finished");
    Ok(status)
}

fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|arg| arg.to_string_lossy().into_owned()));
    parts.join(" ")
}
