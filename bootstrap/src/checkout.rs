//! Checkout-and-clean state machine.
//!
//! Brings the tool checkout to the revision the project requires:
//!
//! 1. Fetch when the revision is not in the local object store.
//! 2. Compare with `HEAD`; stop when they already match.
//! 3. Check out the revision, drop the build marker, rebuild.
//! 4. Request a restart, because the running launcher may be stale.
//!
//! Recording the marker after a successful rebuild is left to the caller.
//!
//! Steps 1 and 2 are independent: a revision that exists locally can still
//! differ from `HEAD`, and a fetch never skips the comparison.

use std::path::Path;

use tracing::{error, info, instrument, warn};

use crate::core::types::{Flow, RebuildStatus, RestartReason, VersionRequirement};
use crate::error::BootstrapError;
use crate::io::builder::Builder;
use crate::io::git::{GitBackend, VcsGateway};
use crate::io::marker::ArtifactMarker;

/// Drives the tool checkout to a required revision.
pub struct VersionController<'a, B, U> {
    gateway: &'a VcsGateway<B>,
    builder: &'a U,
    marker: &'a ArtifactMarker,
    log_dir: &'a Path,
}

impl<'a, B: GitBackend, U: Builder> VersionController<'a, B, U> {
    pub fn new(
        gateway: &'a VcsGateway<B>,
        builder: &'a U,
        marker: &'a ArtifactMarker,
        log_dir: &'a Path,
    ) -> Self {
        Self {
            gateway,
            builder,
            marker,
            log_dir,
        }
    }

    /// Ensure the checkout is at `requirement`.
    ///
    /// No-op when the checkout is not version-controlled, when self-update is
    /// opted out, or when there is no requirement. Returns
    /// [`Flow::Restart`] exactly when the checkout was moved.
    #[instrument(skip_all, fields(required = ?requirement.map(|r| r.revision.as_str())))]
    pub fn ensure_revision(
        &self,
        requirement: Option<&VersionRequirement>,
        opted_out: bool,
    ) -> Result<Flow, BootstrapError> {
        let Some(requirement) = requirement else {
            return Ok(Flow::Continue(()));
        };
        if opted_out || !self.gateway.is_version_controlled() {
            return Ok(Flow::Continue(()));
        }
        let revision = requirement.revision.as_str();

        if !self.gateway.revision_exists(revision)? {
            warn!(
                "Required revision {revision} is not available in the local repository; \
                 fetching updates from git. You can disable this by creating a '{}' file \
                 in your project, but this might lead to strange bugs or build failures.",
                crate::io::config::NO_CHECK_FILE
            );
            self.gateway
                .fetch(requirement.branch.as_deref(), revision)?;
        }

        let current = self.gateway.current_revision()?;
        if current == revision {
            return Ok(Flow::Continue(()));
        }

        warn!(
            "The tool is at {current}, but should be {revision}; updating itself. \
             To disable this, add a '{}' file to your project root. In general, you \
             should only disable this if you are developing the tool.",
            crate::io::config::NO_CHECK_FILE
        );
        self.gateway.checkout(revision)?;
        self.marker.invalidate()?;

        let rebuild = match self.builder.clean_and_build(self.log_dir) {
            Ok(()) => {
                info!(revision, "rebuilt tool after update");
                RebuildStatus::Succeeded
            }
            Err(err) => {
                error!("{err:#}");
                RebuildStatus::Failed {
                    message: format!("{err:#}"),
                }
            }
        };

        Ok(Flow::Restart(RestartReason::CheckedOut {
            from: current,
            to: revision.to_string(),
            rebuild,
        }))
    }
}
