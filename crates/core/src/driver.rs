//! Sequencing of build steps and the report a run produces

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    cancel::CancellationToken,
    error::{Error, FailureKind, Result, StepError},
    result::StepOutcome,
    runner::StepExecutor,
    state::StepState,
    step::BuildStep,
};

/// Lines of stderr quoted for each failing step in [`BuildReport::summary`].
pub const SUMMARY_TAIL_LINES: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Keep going after a step fails instead of stopping the run
    pub continue_on_error: bool,
    /// Run consecutive steps with disjoint resources at the same time
    pub parallel: bool,
    /// Run only the step with this name
    pub only: Option<String>,
}

/// Runs an ordered list of steps through a [`StepExecutor`].
pub struct Driver<E> {
    executor: E,
    options: DriverOptions,
}

impl<E: StepExecutor> Driver<E> {
    pub fn new(executor: E, options: DriverOptions) -> Self {
        Self { executor, options }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Group the selected steps into waves that run one after another.
    ///
    /// Serial mode yields one step per wave. Parallel mode extends the current
    /// wave while the next step touches nothing already in it, so steps that
    /// share resources always keep their declared order.
    pub fn plan<'s>(&self, steps: &'s [BuildStep]) -> Result<Vec<Vec<&'s BuildStep>>> {
        let selected: Vec<&BuildStep> = match &self.options.only {
            Some(name) => {
                let step = steps
                    .iter()
                    .find(|s| &s.name == name)
                    .ok_or_else(|| Error::UnknownStep(name.clone()))?;
                vec![step]
            }
            None => steps.iter().collect(),
        };

        if !self.options.parallel {
            return Ok(selected.into_iter().map(|s| vec![s]).collect());
        }

        let mut waves: Vec<Vec<&BuildStep>> = Vec::new();
        for step in selected {
            match waves.last_mut() {
                Some(wave) if wave.iter().all(|other| !other.touches(step)) => wave.push(step),
                _ => waves.push(vec![step]),
            }
        }
        Ok(waves)
    }

    pub fn run<'s>(
        &self,
        steps: &'s [BuildStep],
        cancel: &CancellationToken,
    ) -> Result<BuildReport<'s>> {
        self.run_with(steps, cancel, |_| {})
    }

    /// Like [`run`](Self::run), calling `on_finished` as each step completes.
    /// Within a parallel wave the callback fires in declaration order once the
    /// whole wave is done.
    pub fn run_with<'s, F>(
        &self,
        steps: &'s [BuildStep],
        cancel: &CancellationToken,
        mut on_finished: F,
    ) -> Result<BuildReport<'s>>
    where
        F: FnMut(&StepReport<'s>),
    {
        let waves = self.plan(steps)?;
        let mut entries: Vec<StepReport<'s>> = waves
            .iter()
            .flatten()
            .copied()
            .map(StepReport::pending)
            .collect();

        let mut next = 0;
        for (i, wave) in waves.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Run cancelled; {} step(s) not started", entries.len() - next);
                break;
            }
            debug!(
                "Wave {}: {}",
                i + 1,
                wave.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
            );

            let mut halt = false;
            for outcome in self.run_wave(wave, cancel) {
                let entry = &mut entries[next];
                entry.record(outcome);
                on_finished(entry);
                if entry.failure_kind().is_some() && !self.options.continue_on_error {
                    halt = true;
                }
                next += 1;
            }

            if halt {
                info!("Stopping after first failure; {} step(s) skipped", entries.len() - next);
                break;
            }
        }

        Ok(BuildReport {
            entries,
            cancelled: cancel.is_cancelled(),
        })
    }

    fn run_wave<'s>(
        &self,
        wave: &[&'s BuildStep],
        cancel: &CancellationToken,
    ) -> Vec<std::result::Result<StepOutcome<'s>, StepError>> {
        if wave.len() == 1 {
            return vec![self.executor.execute(wave[0], cancel)];
        }

        // A dedicated pool sized to the wave: every step blocks on a process,
        // so each one needs its own thread.
        match rayon::ThreadPoolBuilder::new()
            .num_threads(wave.len())
            .thread_name(|i| format!("buildstep-wave-{i}"))
            .build()
        {
            Ok(pool) => pool.install(|| {
                wave.par_iter()
                    .map(|step| self.executor.execute(*step, cancel))
                    .collect()
            }),
            Err(e) => {
                warn!("Could not start worker pool ({}); running wave serially", e);
                wave.iter()
                    .map(|step| self.executor.execute(*step, cancel))
                    .collect()
            }
        }
    }
}

/// Final state of one selected step.
#[derive(Debug, Serialize)]
pub struct StepReport<'s> {
    #[serde(rename = "name", serialize_with = "serialize_step_name")]
    pub step: &'s BuildStep,
    pub state: StepState,
    #[serde(skip)]
    pub outcome: Option<std::result::Result<StepOutcome<'s>, StepError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl<'s> StepReport<'s> {
    fn pending(step: &'s BuildStep) -> Self {
        Self {
            step,
            state: StepState::Pending,
            outcome: None,
            exit_code: None,
        }
    }

    fn record(&mut self, outcome: std::result::Result<StepOutcome<'s>, StepError>) {
        self.state = match &outcome {
            Ok(o) => o.state(),
            Err(StepError::Configuration { .. }) => StepState::ConfigurationError,
            Err(StepError::Launch { .. }) => StepState::LaunchError,
        };
        self.exit_code = outcome.as_ref().ok().and_then(StepOutcome::exit_code);
        self.outcome = Some(outcome);
    }

    pub fn name(&self) -> &str {
        &self.step.name
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.outcome.as_ref()? {
            Ok(outcome) => outcome.failure_kind(),
            Err(e) => Some(e.kind()),
        }
    }

    /// Human-readable detail lines for a failed step.
    fn failure_details(&self, tail: usize) -> Vec<String> {
        let Some(kind) = self.failure_kind() else {
            return Vec::new();
        };

        let mut lines = Vec::new();
        match self.exit_code {
            Some(code) => lines.push(format!("- {}: {} (exit code {})", self.name(), kind, code)),
            None => lines.push(format!("- {}: {}", self.name(), kind)),
        }

        match self.outcome.as_ref() {
            Some(Err(e)) => lines.push(format!("    {}", e)),
            Some(Ok(outcome)) => {
                let stderr = outcome.stderr();
                if stderr.is_truncated() {
                    lines.push(format!("    [... {} bytes truncated ...]", stderr.dropped_bytes()));
                }
                let tail_lines = stderr.tail_lines(tail);
                if !tail_lines.is_empty() {
                    lines.push(format!("    stderr (last {} lines):", tail_lines.len()));
                    lines.extend(tail_lines.into_iter().map(|l| format!("    | {}", l)));
                }
            }
            None => {}
        }
        lines
    }
}

/// Everything a run produced, in plan order.
#[derive(Debug, Serialize)]
pub struct BuildReport<'s> {
    entries: Vec<StepReport<'s>>,
    cancelled: bool,
}

impl<'s> BuildReport<'s> {
    pub fn entries(&self) -> &[StepReport<'s>] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&StepReport<'s>> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn succeeded(&self) -> bool {
        self.entries.iter().all(|e| e.state == StepState::Succeeded)
    }

    pub fn first_failure(&self) -> Option<&StepReport<'s>> {
        self.entries.iter().find(|e| e.failure_kind().is_some())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &StepReport<'s>> {
        self.entries.iter().filter(|e| e.is_skipped())
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        if let Some(entry) = self.first_failure() {
            return entry.failure_kind();
        }
        if self.succeeded() {
            None
        } else {
            // Nothing failed but something never ran: the run was cut short.
            Some(FailureKind::Cancelled)
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.failure_kind()
            .map(FailureKind::exit_code)
            .unwrap_or(FailureKind::SUCCESS_EXIT_CODE)
    }

    /// The one-line verdict printed at the end of a run.
    pub fn status_line(&self) -> String {
        match (self.failure_kind(), self.first_failure()) {
            (None, _) => "build success".to_string(),
            (Some(kind), Some(entry)) => {
                format!("build failed: {} in step '{}'", kind, entry.name())
            }
            (Some(kind), None) => format!("build failed: {}", kind),
        }
    }

    /// Verdict followed by details for every failing step and the skipped list.
    pub fn summary(&self) -> String {
        let mut lines = vec![self.status_line()];

        if self.succeeded() {
            lines.push(format!("{} step(s) succeeded", self.entries.len()));
            return lines.join("\n");
        }

        for entry in &self.entries {
            lines.extend(entry.failure_details(SUMMARY_TAIL_LINES));
        }

        let skipped: Vec<&str> = self.skipped().map(|e| e.name()).collect();
        if !skipped.is_empty() {
            lines.push(format!("skipped: {}", skipped.join(", ")));
        }
        if self.cancelled {
            lines.push("run was cancelled".to_string());
        }
        lines.join("\n")
    }
}

fn serialize_step_name<S: serde::Serializer>(
    step: &&BuildStep,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&step.name)
}
