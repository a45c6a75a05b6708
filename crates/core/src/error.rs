use std::io;
use std::path::Path;

use crate::state::StepState;

/// Errors that can occur while loading configuration or planning a build
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No step named '{0}'")]
    UnknownStep(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: StepState, to: StepState },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type alias for buildstep operations
pub type Result<T> = std::result::Result<T, Error>;

/// A step that never produced a running process.
///
/// Both variants are distinct from a process that ran and exited non-zero,
/// which is reported through [`crate::StepResult`] instead.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("step '{step}' is misconfigured: {reason}")]
    Configuration { step: String, reason: String },

    #[error("step '{step}' could not launch '{program}': {source}")]
    Launch {
        step: String,
        program: String,
        #[source]
        source: io::Error,
    },
}

impl StepError {
    pub fn configuration(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            step: step.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_dir(step: impl Into<String>, dir: &Path) -> Self {
        Self::configuration(
            step,
            format!("working directory {} does not exist", dir.display()),
        )
    }

    pub fn step_name(&self) -> &str {
        match self {
            Self::Configuration { step, .. } | Self::Launch { step, .. } => step,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Configuration { .. } => FailureKind::Configuration,
            Self::Launch { .. } => FailureKind::Launch,
        }
    }
}

/// Classes of non-success outcome, each with its own process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Configuration,
    Launch,
    NonZeroExit,
    TimedOut,
    Cancelled,
}

impl FailureKind {
    pub const SUCCESS_EXIT_CODE: i32 = 0;

    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::NonZeroExit => 1,
            FailureKind::Configuration => 2,
            FailureKind::Launch => 3,
            FailureKind::TimedOut => 4,
            FailureKind::Cancelled => 130,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FailureKind::Configuration => "configuration error",
            FailureKind::Launch => "launch error",
            FailureKind::NonZeroExit => "non-zero exit",
            FailureKind::TimedOut => "timed out",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let kinds = [
            FailureKind::Configuration,
            FailureKind::Launch,
            FailureKind::NonZeroExit,
            FailureKind::TimedOut,
            FailureKind::Cancelled,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| k.exit_code()).collect();
        codes.push(FailureKind::SUCCESS_EXIT_CODE);
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len() + 1);
    }

    #[test]
    fn test_step_error_kind() {
        let err = StepError::configuration("front-end", "command is empty");
        assert_eq!(err.kind(), FailureKind::Configuration);
        assert_eq!(err.step_name(), "front-end");
        assert_eq!(
            err.to_string(),
            "step 'front-end' is misconfigured: command is empty"
        );

        let err = StepError::Launch {
            step: "back-end".into(),
            program: "go".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.kind(), FailureKind::Launch);
    }
}
