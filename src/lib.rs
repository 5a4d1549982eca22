#![forbid(unsafe_code)]

//! Test-run protocol engine for CppUnitTestFramework executables.
//!
//! Spawns a test executable, frames its stdout into lines, decodes the
//! discovery and run grammars, and serialises sessions so at most one
//! process runs per [`runner::RunCoordinator`].

pub mod config;
pub mod errors;
pub mod mode;
pub mod models;
pub mod protocol;
pub mod runner;
pub mod supervisor;
pub mod watcher;

pub use config::AdapterConfig;
pub use errors::{AppError, Result};
