//! Command Line Interface (CLI) layer for ndvichip.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) that builds a chip dataset, exports
//! its table and writes the run summary. It wires user-provided options to the
//! underlying library functionality exposed via `ndvichip::api`.
//!
//! If you are embedding ndvichip into another application, prefer using
//! the high-level `ndvichip::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
