//! I/O adapters for the bootstrap.

pub mod builder;
pub mod config;
pub mod fingerprint;
pub mod git;
pub mod marker;
pub mod process;
pub mod prompt;
pub mod repository;
