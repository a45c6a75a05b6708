//! Per-step lifecycle
//!
//! ```text
//! Pending -> Launching -> Running -> {Succeeded, Failed, TimedOut, Cancelled}
//! Pending -> ConfigurationError
//! Launching -> LaunchError
//! ```

use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepState {
    #[default]
    Pending,
    Launching,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
    LaunchError,
    ConfigurationError,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            StepState::Pending | StepState::Launching | StepState::Running
        )
    }

    pub fn can_advance_to(self, next: StepState) -> bool {
        use StepState::*;
        matches!(
            (self, next),
            (Pending, Launching)
                | (Pending, ConfigurationError)
                | (Launching, Running)
                | (Launching, LaunchError)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Running, Cancelled)
        )
    }

    /// Move to `next`, refusing anything off the lifecycle graph.
    pub fn advance(self, next: StepState) -> Result<StepState> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Launching => "launching",
            StepState::Running => "running",
            StepState::Succeeded => "succeeded",
            StepState::Failed => "failed",
            StepState::TimedOut => "timed-out",
            StepState::Cancelled => "cancelled",
            StepState::LaunchError => "launch-error",
            StepState::ConfigurationError => "configuration-error",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one step through its lifecycle and logs each transition.
#[derive(Debug)]
pub(crate) struct StepTracker<'a> {
    step: &'a str,
    state: StepState,
}

impl<'a> StepTracker<'a> {
    pub(crate) fn new(step: &'a str) -> Self {
        Self {
            step,
            state: StepState::Pending,
        }
    }

    pub(crate) fn state(&self) -> StepState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: StepState) -> Result<()> {
        let from = self.state;
        self.state = from.advance(next)?;
        tracing::debug!(step = self.step, %from, to = %next, "step transition");
        Ok(())
    }

    /// Like [`advance`](Self::advance) for transitions the caller knows are legal.
    pub(crate) fn enter(&mut self, next: StepState) {
        if let Err(e) = self.advance(next) {
            tracing::error!(step = self.step, "{}", e);
        }
    }
}
