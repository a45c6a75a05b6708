//! buildstep - run the build steps of a project and report how each one ended
//!
//! This crate provides functionality to:
//! - Describe build steps as a program, its arguments and a working directory
//! - Run a step as a child process with a timeout, cancellation and bounded output capture
//! - Sequence steps serially or in parallel waves and summarise the outcome
pub mod cancel;
pub mod config;
pub mod driver;
pub mod error;
pub mod output;
pub mod result;
pub mod runner;
pub mod state;
pub mod step;

// Re-export commonly used types and traits
pub use error::{Error, FailureKind, Result, StepError};

// Re-export main API components
pub use cancel::CancellationToken;
pub use config::{Config, StepConfig};
pub use driver::{BuildReport, Driver, DriverOptions, StepReport};
pub use output::CapturedOutput;
pub use result::{Interrupted, StepOutcome, StepResult};
pub use runner::{ProcessRunner, RunOptions, StdioMode, StepExecutor};
pub use state::StepState;
pub use step::BuildStep;
