//! Command Line Interface (CLI) layer for SATMATCH.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for the `equalize`, `match`,
//! `to8bits` and `batch` subcommands. It wires user-provided options to the
//! library functionality exposed via `satmatch::api`.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
