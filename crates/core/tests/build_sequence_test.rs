//! End-to-end runs of the driver against real processes

#![cfg(unix)]

use buildstep_core::{
    BuildStep, CancellationToken, Config, Driver, DriverOptions, FailureKind, ProcessRunner,
    RunOptions, StepState,
};
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[test]
fn test_halts_after_failing_front_end() {
    let steps = vec![
        BuildStep::new("back-end", ["echo", "ok"], "."),
        BuildStep::new("front-end", ["false"], "."),
        BuildStep::new("package", ["echo", "never"], "."),
    ];
    let driver = Driver::new(ProcessRunner::default(), DriverOptions::default());
    let report = driver.run(&steps, &CancellationToken::new()).unwrap();

    let back_end = report.get("back-end").unwrap();
    assert_eq!(back_end.state, StepState::Succeeded);
    assert_eq!(back_end.exit_code, Some(0));

    let front_end = report.get("front-end").unwrap();
    assert_eq!(front_end.state, StepState::Failed);
    assert_eq!(front_end.exit_code, Some(1));

    assert!(report.get("package").unwrap().is_skipped());
    assert_eq!(report.exit_code(), FailureKind::NonZeroExit.exit_code());
    assert_eq!(report.status_line(), "build failed: non-zero exit in step 'front-end'");
}

#[test]
fn test_config_file_drives_the_run() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("backend")).unwrap();
    fs::create_dir_all(temp.path().join("frontend")).unwrap();
    fs::write(
        temp.path().join(".buildstep.json"),
        r#"{
            "steps": [
                { "name": "back-end", "command": ["sh", "-c", "pwd > built.txt"], "working_dir": "backend" },
                { "name": "front-end", "command": ["sh", "-c", "echo $TARGET > built.txt"],
                  "working_dir": "frontend", "env": { "TARGET": "web" } }
            ]
        }"#,
    )
    .unwrap();

    let config = Config::discover(&temp.path().join("frontend")).unwrap();
    let steps = config.build_steps().unwrap();
    let driver = Driver::new(ProcessRunner::new(config.run_options()), config.driver_options());
    let report = driver.run(&steps, &CancellationToken::new()).unwrap();

    assert!(report.succeeded(), "{}", report.summary());
    let backend_pwd = fs::read_to_string(temp.path().join("backend/built.txt")).unwrap();
    assert_eq!(
        fs::canonicalize(backend_pwd.trim()).unwrap(),
        fs::canonicalize(temp.path().join("backend")).unwrap()
    );
    assert_eq!(
        fs::read_to_string(temp.path().join("frontend/built.txt")).unwrap(),
        "web\n"
    );
}

#[test]
fn test_missing_working_directory_is_configuration_failure() {
    let temp = TempDir::new().unwrap();
    let steps = vec![BuildStep::new(
        "front-end",
        ["touch", "launched"],
        temp.path().join("frontend"),
    )];
    let driver = Driver::new(ProcessRunner::default(), DriverOptions::default());
    let report = driver.run(&steps, &CancellationToken::new()).unwrap();

    assert_eq!(report.entries()[0].state, StepState::ConfigurationError);
    assert_eq!(report.exit_code(), FailureKind::Configuration.exit_code());
    assert!(!temp.path().join("launched").exists());
    assert!(report.summary().contains("does not exist"));
}

#[test]
fn test_timeout_reported_with_its_own_code() {
    let steps = vec![BuildStep::new("slow", ["sleep", "10"], ".")];
    let runner = ProcessRunner::new(
        RunOptions::default()
            .with_timeout(Some(Duration::from_millis(300)))
            .with_grace_period(Duration::from_millis(200)),
    );
    let driver = Driver::new(runner, DriverOptions::default());

    let started = Instant::now();
    let report = driver.run(&steps, &CancellationToken::new()).unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.entries()[0].state, StepState::TimedOut);
    assert_eq!(report.exit_code(), FailureKind::TimedOut.exit_code());
}

#[test]
fn test_parallel_steps_overlap_in_time() {
    let temp = TempDir::new().unwrap();
    let steps = vec![
        BuildStep::new("back-end", ["sleep", "0.5"], temp.path())
            .with_resource(temp.path().join("backend")),
        BuildStep::new("front-end", ["sleep", "0.5"], temp.path())
            .with_resource(temp.path().join("frontend")),
    ];
    let driver = Driver::new(
        ProcessRunner::default(),
        DriverOptions {
            parallel: true,
            ..Default::default()
        },
    );

    let started = Instant::now();
    let report = driver.run(&steps, &CancellationToken::new()).unwrap();

    assert!(report.succeeded());
    assert!(started.elapsed() < Duration::from_millis(950), "{:?}", started.elapsed());
}
