//! The step runner: launches one [`BuildStep`] and reports how it ended.

use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::StepError;
use crate::output;
use crate::result::{Interrupted, StepOutcome, StepResult};
use crate::state::{StepState, StepTracker};
use crate::step::BuildStep;

/// How long to wait for the stream readers after the child is gone.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Anything that can execute a build step.
///
/// Implementations must be safe to call concurrently; each call owns its
/// process and buffers.
pub trait StepExecutor: Send + Sync {
    fn execute<'s>(
        &self,
        step: &'s BuildStep,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome<'s>, StepError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Pipe stdout/stderr into bounded buffers
    #[default]
    Capture,
    /// Let the child write straight to our stdout/stderr
    Inherit,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Wall-clock limit per step. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Time between the polite stop request and the forced kill.
    pub grace_period: Duration,
    /// Bytes kept per captured stream.
    pub output_limit: usize,
    pub stdio: StdioMode,
    pub poll_interval: Duration,
}

impl RunOptions {
    pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
    pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    pub fn with_stdio(mut self, stdio: StdioMode) -> Self {
        self.stdio = stdio;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            grace_period: Self::DEFAULT_GRACE_PERIOD,
            output_limit: Self::DEFAULT_OUTPUT_LIMIT,
            stdio: StdioMode::Capture,
            poll_interval: Duration::from_millis(25),
        }
    }
}

/// Why the wait loop stopped.
enum Stop {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs steps as real OS processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    options: RunOptions,
}

impl ProcessRunner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn build_command(&self, step: &BuildStep, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(step.args())
            .current_dir(&step.working_dir)
            .stdin(Stdio::null());

        for (key, value) in &step.env {
            cmd.env(key, value);
        }

        match self.options.stdio {
            StdioMode::Capture => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            StdioMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        // Lead a fresh process group so termination reaches grandchildren too.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd
    }

    fn wait(&self, child: &mut Child, started: Instant, cancel: &CancellationToken) -> Stop {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Stop::Exited(Ok(status)),
                Ok(None) => {}
                Err(e) => {
                    warn!("try_wait failed ({}); blocking on child", e);
                    return Stop::Exited(child.wait());
                }
            }

            if cancel.is_cancelled() {
                return Stop::Cancelled;
            }

            let mut nap = self.options.poll_interval;
            if let Some(limit) = self.options.timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    return Stop::TimedOut;
                }
                nap = nap.min(limit - elapsed);
            }
            thread::sleep(nap);
        }
    }
}

impl StepExecutor for ProcessRunner {
    fn execute<'s>(
        &self,
        step: &'s BuildStep,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome<'s>, StepError> {
        let mut tracker = StepTracker::new(&step.name);

        if let Err(e) = step.validate() {
            tracker.enter(StepState::ConfigurationError);
            return Err(e);
        }
        let program = step.program().unwrap_or_default();

        tracker.enter(StepState::Launching);
        debug!(
            step = %step.name,
            dir = %step.working_dir.display(),
            "spawning: {}",
            step.to_shell_command()
        );
        let mut child = match self.build_command(step, program).spawn() {
            Ok(child) => child,
            Err(source) => {
                tracker.enter(StepState::LaunchError);
                return Err(StepError::Launch {
                    step: step.name.clone(),
                    program: program.to_string(),
                    source,
                });
            }
        };
        tracker.enter(StepState::Running);
        info!(step = %step.name, pid = child.id(), "started");

        let limit = self.options.output_limit;
        let stdout = child
            .stdout
            .take()
            .map(|s| output::spawn_reader(s, limit, "stdout"));
        let stderr = child
            .stderr
            .take()
            .map(|s| output::spawn_reader(s, limit, "stderr"));

        let started = Instant::now();
        let stop = self.wait(&mut child, started, cancel);

        let reason = match &stop {
            Stop::Exited(_) => None,
            Stop::TimedOut => Some("timed out"),
            Stop::Cancelled => Some("cancelled"),
        };
        match reason {
            Some(reason) => {
                warn!(
                    step = %step.name,
                    timeout = ?self.options.timeout,
                    "{}; terminating",
                    reason
                );
                let grace = self.options.grace_period;
                if let Err(e) = terminate(&mut child, grace, self.options.poll_interval) {
                    warn!(step = %step.name, "failed to reap process: {}", e);
                }
            }
            // Background jobs the step left behind would keep our pipes open.
            None => kill_group(&child),
        }
        let elapsed = started.elapsed();

        let drain_deadline = Instant::now() + OUTPUT_DRAIN_TIMEOUT;
        let stdout = output::collect(stdout, drain_deadline);
        let stderr = output::collect(stderr, drain_deadline);

        let outcome = match stop {
            Stop::TimedOut => {
                StepOutcome::TimedOut(Interrupted::new(step, elapsed, stdout, stderr))
            }
            Stop::Cancelled => {
                StepOutcome::Cancelled(Interrupted::new(step, elapsed, stdout, stderr))
            }
            Stop::Exited(status) => {
                let exit_code = match status {
                    Ok(status) => exit_code_of(status),
                    Err(e) => {
                        warn!(step = %step.name, "could not read exit status: {}", e);
                        -1
                    }
                };
                StepOutcome::Finished(StepResult::new(step, exit_code, stdout, stderr, elapsed))
            }
        };

        tracker.enter(outcome.state());
        info!(
            step = %step.name,
            state = %tracker.state(),
            elapsed_ms = elapsed.as_millis() as u64,
            "finished"
        );
        Ok(outcome)
    }
}

/// Exit code, or `128 + signal` for a child killed by a signal.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// SIGKILL whatever is left in the group led by an already reaped child.
#[cfg(unix)]
fn kill_group(child: &Child) {
    let group = -(child.id() as libc::pid_t);
    if unsafe { libc::kill(group, libc::SIGKILL) } == 0 {
        debug!("killed leftover processes in group {}", child.id());
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

/// Ask the child to stop, then force it after `grace`. Always reaps the child.
#[cfg(unix)]
fn terminate(child: &mut Child, grace: Duration, poll: Duration) -> io::Result<ExitStatus> {
    // Negative pid addresses the whole process group led by the child.
    let group = -(child.id() as libc::pid_t);
    unsafe {
        libc::kill(group, libc::SIGTERM);
    }

    let deadline = Instant::now() + grace;
    loop {
        if let Some(status) = child.try_wait()? {
            // Leader is gone; stragglers in its group still hold our pipes.
            kill_group(child);
            return Ok(status);
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(poll.min(deadline - now));
    }

    warn!("process {} ignored SIGTERM for {:?}; killing", child.id(), grace);
    unsafe {
        libc::kill(group, libc::SIGKILL);
    }
    child.wait()
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _grace: Duration, _poll: Duration) -> io::Result<ExitStatus> {
    if let Err(e) = child.kill() {
        warn!("failed to kill process {}: {}", child.id(), e);
    }
    child.wait()
}
