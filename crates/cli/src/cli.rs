use std::path::PathBuf;

use buildstep_core::{Config, DriverOptions};
use clap::{ArgAction, Parser, builder::FalseyValueParser};

/// Build the back end, then the front end, and report how each step ended
#[derive(Parser, Debug)]
#[command(name = "buildstep")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    RUST_LOG=debug    Enable debug logging")]
pub struct Cli {
    /// Run only the named step
    #[arg(long, value_name = "NAME", env = "BUILDSTEP_STEP")]
    pub step: Option<String>,

    /// Run consecutive steps with disjoint resources at the same time
    #[arg(long, env = "BUILDSTEP_PARALLEL", value_parser = FalseyValueParser::new())]
    pub parallel: bool,

    /// Per-step wall-clock limit in seconds (0 disables the limit)
    #[arg(long, value_name = "SECONDS", env = "BUILDSTEP_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Run the remaining steps after a failure instead of stopping
    #[arg(long, env = "BUILDSTEP_CONTINUE_ON_ERROR", value_parser = FalseyValueParser::new())]
    pub continue_on_error: bool,

    /// Use this config file instead of searching for .buildstep.json
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Seconds a stopped step gets to exit before it is killed
    #[arg(long, value_name = "SECONDS")]
    pub grace_period: Option<u64>,

    /// Stream step output to the terminal instead of capturing it
    #[arg(long)]
    pub inherit_output: bool,

    /// Print the configured steps and exit
    #[arg(short, long, conflicts_with = "dry_run")]
    pub list: bool,

    /// Print the execution plan without running anything
    #[arg(short, long)]
    pub dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Layer command-line settings over values from the config file.
    pub fn apply(&self, config: &mut Config) {
        match self.timeout {
            Some(0) => config.timeout_secs = None,
            Some(secs) => config.timeout_secs = Some(secs),
            None => {}
        }
        if let Some(secs) = self.grace_period {
            config.grace_period_ms = Some(secs.saturating_mul(1000));
        }
        config.parallel |= self.parallel;
        config.continue_on_error |= self.continue_on_error;
        config.inherit_output |= self.inherit_output;
    }

    pub fn driver_options(&self, config: &Config) -> DriverOptions {
        DriverOptions {
            only: self.step.clone(),
            ..config.driver_options()
        }
    }
}
