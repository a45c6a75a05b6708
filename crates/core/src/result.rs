//! What a launched step leaves behind

use std::time::Duration;

use serde::Serialize;

use crate::error::FailureKind;
use crate::output::CapturedOutput;
use crate::state::StepState;
use crate::step::BuildStep;

/// Outcome of a step whose process ran to termination on its own.
///
/// Only ever produced for a process that was actually started.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult<'s> {
    #[serde(serialize_with = "serialize_step_name")]
    step: &'s BuildStep,
    exit_code: i32,
    stdout: CapturedOutput,
    stderr: CapturedOutput,
    succeeded: bool,
    #[serde(with = "duration_ms")]
    duration: Duration,
}

impl<'s> StepResult<'s> {
    pub fn new(
        step: &'s BuildStep,
        exit_code: i32,
        stdout: CapturedOutput,
        stderr: CapturedOutput,
        duration: Duration,
    ) -> Self {
        Self {
            step,
            exit_code,
            stdout,
            stderr,
            succeeded: exit_code == 0,
            duration,
        }
    }

    pub fn step(&self) -> &'s BuildStep {
        self.step
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn stdout(&self) -> &CapturedOutput {
        &self.stdout
    }

    pub fn stderr(&self) -> &CapturedOutput {
        &self.stderr
    }

    /// True exactly when the exit code is 0.
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// A launched step that was stopped before it finished.
#[derive(Debug, Clone, Serialize)]
pub struct Interrupted<'s> {
    #[serde(serialize_with = "serialize_step_name")]
    step: &'s BuildStep,
    #[serde(with = "duration_ms")]
    elapsed: Duration,
    stdout: CapturedOutput,
    stderr: CapturedOutput,
}

impl<'s> Interrupted<'s> {
    pub fn new(
        step: &'s BuildStep,
        elapsed: Duration,
        stdout: CapturedOutput,
        stderr: CapturedOutput,
    ) -> Self {
        Self {
            step,
            elapsed,
            stdout,
            stderr,
        }
    }

    pub fn step(&self) -> &'s BuildStep {
        self.step
    }

    /// Time from launch until the process was reaped.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn stdout(&self) -> &CapturedOutput {
        &self.stdout
    }

    pub fn stderr(&self) -> &CapturedOutput {
        &self.stderr
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum StepOutcome<'s> {
    Finished(StepResult<'s>),
    TimedOut(Interrupted<'s>),
    Cancelled(Interrupted<'s>),
}

impl<'s> StepOutcome<'s> {
    pub fn step(&self) -> &'s BuildStep {
        match self {
            StepOutcome::Finished(r) => r.step,
            StepOutcome::TimedOut(i) | StepOutcome::Cancelled(i) => i.step,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, StepOutcome::Finished(r) if r.succeeded)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            StepOutcome::Finished(r) if r.succeeded => None,
            StepOutcome::Finished(_) => Some(FailureKind::NonZeroExit),
            StepOutcome::TimedOut(_) => Some(FailureKind::TimedOut),
            StepOutcome::Cancelled(_) => Some(FailureKind::Cancelled),
        }
    }

    pub fn state(&self) -> StepState {
        match self {
            StepOutcome::Finished(r) if r.succeeded => StepState::Succeeded,
            StepOutcome::Finished(_) => StepState::Failed,
            StepOutcome::TimedOut(_) => StepState::TimedOut,
            StepOutcome::Cancelled(_) => StepState::Cancelled,
        }
    }

    pub fn stdout(&self) -> &CapturedOutput {
        match self {
            StepOutcome::Finished(r) => &r.stdout,
            StepOutcome::TimedOut(i) | StepOutcome::Cancelled(i) => &i.stdout,
        }
    }

    pub fn stderr(&self) -> &CapturedOutput {
        match self {
            StepOutcome::Finished(r) => &r.stderr,
            StepOutcome::TimedOut(i) | StepOutcome::Cancelled(i) => &i.stderr,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StepOutcome::Finished(r) => Some(r.exit_code),
            _ => None,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            StepOutcome::Finished(r) => r.duration,
            StepOutcome::TimedOut(i) | StepOutcome::Cancelled(i) => i.elapsed,
        }
    }

    pub fn as_result(&self) -> Option<&StepResult<'s>> {
        match self {
            StepOutcome::Finished(r) => Some(r),
            _ => None,
        }
    }
}

fn serialize_step_name<S>(step: &&BuildStep, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&step.name)
}

mod duration_ms {
    use std::time::Duration;

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        s.serialize_u64(d.as_millis() as u64)
    }
}
