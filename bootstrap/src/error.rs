//! Fatal bootstrap failures.
//!
//! Every variant renders a message that can be printed to the user as is,
//! including the remedy to try. Restarts are not errors; see
//! [`crate::core::types::Flow`].

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::BuildStep;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(
        "failed to fetch tool updates from git ({remote}) while looking for revision {revision}"
    )]
    Fetch { revision: String, remote: String },

    #[error("failed to update the tool checkout at '{}' to revision {revision}", .repo.display())]
    Checkout { repo: PathBuf, revision: String },

    #[error("you do not have {tool} on your PATH; cannot build the tool{}", hint_suffix(.hint))]
    ToolNotFound { tool: String, hint: Option<String> },

    #[error(
        "'{step}' failed in the tool repository at '{}' and the tool is not properly built; \
         it will be unusable until the error is corrected. Check the log at {} to see what broke.\n\
         It is possible that running this command will fix it:\n  {remedy}",
        .repo.display(),
        .log_path.display()
    )]
    BuildFailure {
        step: BuildStep,
        repo: PathBuf,
        log_path: PathBuf,
        remedy: String,
    },

    #[error("unknown resource '{name}'")]
    UnknownResource { name: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!("\n{hint}"),
        None => String::new(),
    }
}

impl BootstrapError {
    /// Log file to inspect, for failures that produced one.
    pub fn log_path(&self) -> Option<&PathBuf> {
        match self {
            BootstrapError::BuildFailure { log_path, .. } => Some(log_path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_failure_message_names_log_and_remedy() {
        let err = BootstrapError::BuildFailure {
            step: BuildStep::Clean,
            repo: PathBuf::from("/opt/tool"),
            log_path: PathBuf::from("/tmp/log/ant-clean.log"),
            remedy: "git -C \"/opt/tool\" clean -xfd".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("'clean' failed"));
        assert!(message.contains("/tmp/log/ant-clean.log"));
        assert!(message.contains("clean -xfd"));
        assert_eq!(
            err.log_path(),
            Some(&PathBuf::from("/tmp/log/ant-clean.log"))
        );
    }

    #[test]
    fn tool_not_found_appends_hint() {
        let err = BootstrapError::ToolNotFound {
            tool: "ant".to_string(),
            hint: Some("Try running 'brew install ant'.".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "you do not have ant on your PATH; cannot build the tool\nTry running 'brew install ant'."
        );

        let bare = BootstrapError::ToolNotFound {
            tool: "ant".to_string(),
            hint: None,
        };
        assert!(!bare.to_string().contains('\n'));
    }
}
