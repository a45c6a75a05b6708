use buildstep::{Cli, commands::run_command};
use buildstep_core::FailureKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; -v/-vv raise the default level
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run_command(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("buildstep: {e:#}");
            std::process::exit(FailureKind::Configuration.exit_code());
        }
    }
}
