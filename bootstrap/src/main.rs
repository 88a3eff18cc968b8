//! Launcher bootstrap CLI.
//!
//! Brings the tool checkout to the revision the project requires, builds it
//! when needed, and reports the version identity and launch properties the
//! hosting launcher hands to the tool. When the checkout was mutated the
//! process re-executes itself from scratch.

use std::path::{Path, PathBuf};
use std::process::Command as Process;

use anyhow::{Context, Result, anyhow};
use bootstrap::coordinator::{BootstrapCoordinator, Components};
use bootstrap::core::resources::ResourceLocator;
use bootstrap::core::types::{Flow, RebuildStatus, RestartReason};
use bootstrap::exit_codes;
use bootstrap::identity::VersionIdentityResolver;
use bootstrap::io::prompt::TerminalConfirm;
use bootstrap::{BootstrapError, logging};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

/// Restarts already performed in this chain of re-executions.
const RESTART_DEPTH_ENV: &str = "TOOL_BOOTSTRAP_RESTARTS";
const MAX_RESTARTS: u32 = 3;

#[derive(Parser)]
#[command(
    name = "bootstrap",
    version,
    about = "Keep the tool checkout at the required revision and built"
)]
struct Cli {
    /// Tool checkout root. Defaults to the parent of the executable's directory.
    #[arg(long, global = true)]
    repo: Option<PathBuf>,
    /// Project root holding `.toolversion`. Defaults to the current directory.
    #[arg(long, global = true)]
    project: Option<PathBuf>,
    /// Directory for builder logs. Defaults to `<project>/tool-out/log`.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Exit with the restart code instead of re-executing.
    #[arg(long, global = true)]
    no_reexec: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Update the checkout to the required revision and build it if needed.
    Ensure,
    /// Print the version identity used for cache keying.
    Version,
    /// Print the path of a named resource.
    Resource { name: String },
    /// Bootstrap, then print the launch properties, one per line.
    LaunchArgs,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(&cli) {
        Ok(Flow::Continue(())) => exit_codes::OK,
        Ok(Flow::Restart(reason)) => restart(&cli, &reason),
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<Flow> {
    let repo = match &cli.repo {
        Some(repo) => repo.clone(),
        None => default_repo_root()?,
    };
    if let Command::Resource { name } = &cli.command {
        let path = ResourceLocator::new(&repo).locate(name)?;
        println!("{}", path.display());
        return Ok(Flow::Continue(()));
    }

    let project = match &cli.project {
        Some(project) => project.clone(),
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| project.join("tool-out").join("log"));
    let parts = Components::open(&repo, &project, log_dir, |key| std::env::var(key).ok())?;

    match &cli.command {
        Command::Version => {
            let identity = VersionIdentityResolver::new(
                &parts.gateway,
                &parts.settings,
                &parts.project,
                &TerminalConfirm,
            )
            .resolve()?;
            Ok(identity.map(|identity| println!("{identity}")))
        }
        Command::Ensure => Ok(BootstrapCoordinator::bootstrap(parts)?.map(|_| ())),
        Command::LaunchArgs => {
            let coordinator = match BootstrapCoordinator::bootstrap(parts)? {
                Flow::Continue(coordinator) => coordinator,
                Flow::Restart(reason) => return Ok(Flow::Restart(reason)),
            };
            let props = coordinator.launch_properties(&TerminalConfirm)?;
            Ok(props.map(|props| {
                for arg in props.to_args() {
                    println!("{arg}");
                }
            }))
        }
        Command::Resource { .. } => Ok(Flow::Continue(())),
    }
}

/// `<exe dir>/..`, the checkout the installed binary belongs to.
fn default_repo_root() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locate current executable")?;
    exe.parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("cannot derive repository root from {}", exe.display()))
}

fn restart(cli: &Cli, reason: &RestartReason) -> i32 {
    if let RestartReason::CheckedOut {
        rebuild: RebuildStatus::Failed { .. },
        ..
    } = reason
    {
        warn!("rebuild after update failed; it will be retried after the restart");
    }
    if cli.no_reexec {
        info!(reason = %reason, "restart required");
        return exit_codes::RESTART;
    }
    match reexec() {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            exit_codes::FAILED
        }
    }
}

/// Start the current executable again with the same arguments.
fn reexec() -> Result<i32> {
    let depth = restart_depth(std::env::var(RESTART_DEPTH_ENV).ok().as_deref());
    if depth >= MAX_RESTARTS {
        return Err(anyhow!(
            "restarted {depth} times in a row; giving up. Rerun with --no-reexec to inspect"
        ));
    }
    let exe = std::env::current_exe().context("locate current executable")?;
    let mut cmd = Process::new(&exe);
    cmd.args(std::env::args_os().skip(1))
        .env(RESTART_DEPTH_ENV, (depth + 1).to_string());
    info!(exe = %exe.display(), "restarting");
    exec(cmd)
}

#[cfg(unix)]
fn exec(mut cmd: Process) -> Result<i32> {
    use std::os::unix::process::CommandExt;
    let err = cmd.exec();
    Err(err).context("re-execute bootstrap")
}

#[cfg(not(unix))]
fn exec(mut cmd: Process) -> Result<i32> {
    let status = cmd.status().context("re-execute bootstrap")?;
    Ok(status.code().unwrap_or(exit_codes::FAILED))
}

fn restart_depth(raw: Option<&str>) -> u32 {
    raw.and_then(|raw| raw.trim().parse().ok()).unwrap_or(0)
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<BootstrapError>() {
        Some(BootstrapError::UnknownResource { .. }) => exit_codes::USAGE,
        _ => exit_codes::FAILED,
    }
}
