use anyhow::{Context, Result};
use buildstep_core::{CancellationToken, Config, Driver, ProcessRunner};
use std::env;
use tracing::{debug, info};

use crate::cli::Cli;
use crate::display::{plan_lines, step_line, step_listing};
use crate::signal::cancel_on_interrupt;

/// Load configuration, run the selected steps and return the process exit code.
///
/// Errors returned here happen before any step starts.
pub fn run_command(cli: &Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let cwd = env::current_dir().context("Failed to read current directory")?;
            Config::discover(&cwd)?
        }
    };
    cli.apply(&mut config);
    debug!("Effective config: {:?}", config);

    let steps = config.build_steps()?;

    if cli.list {
        for line in step_listing(&steps) {
            println!("{}", line);
        }
        return Ok(0);
    }

    let driver = Driver::new(
        ProcessRunner::new(config.run_options()),
        cli.driver_options(&config),
    );

    if cli.dry_run {
        let waves = driver.plan(&steps)?;
        for line in plan_lines(&waves) {
            println!("{}", line);
        }
        return Ok(0);
    }

    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel);

    info!("Running {} step(s) from {}", steps.len(), config.base_dir().display());
    let report = driver.run_with(&steps, &cancel, |entry| println!("{}", step_line(entry)))?;

    println!("{}", report.summary());
    Ok(report.exit_code())
}
