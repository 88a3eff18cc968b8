//! Self-management layer for the build-tool launcher.
//!
//! Before the tool itself runs, the launcher must make sure the local checkout
//! of the tool's own source is at the revision the project asks for, that a
//! compiled artifact exists and is current, and that a stable version identity
//! is available for cache keying. The crate keeps the same split the rest of
//! the workspace uses:
//!
//! - **[`core`]**: Pure, deterministic types and the static resource registry.
//!   No I/O.
//! - **[`io`]**: Side-effecting adapters (environment, git, external builder,
//!   filesystem markers, terminal prompt). Each external collaborator sits
//!   behind a trait so tests can script it.
//!
//! Orchestration modules ([`checkout`], [`identity`], [`coordinator`],
//! [`launch`]) combine the two. Every phase that may mutate the checkout
//! returns a [`core::types::Flow`], so a required process restart travels up
//! as a value rather than as an error.

pub mod checkout;
pub mod coordinator;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod identity;
pub mod io;
pub mod launch;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::BootstrapError;
