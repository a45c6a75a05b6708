use crate::{
    driver::DriverOptions,
    error::{Error, Result},
    runner::{RunOptions, StdioMode},
    step::BuildStep,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::defaults;

pub const CONFIG_FILE_NAMES: [&str; 2] = [".buildstep.json", "buildstep.json"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    /// Per-step limit; 0 means no limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_limit_bytes: Option<usize>,

    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub inherit_output: bool,

    // Directory relative paths resolve against (internal, not exposed in JSON)
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StepConfig {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default = "current_dir_marker")]
    pub working_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

fn current_dir_marker() -> PathBuf {
    PathBuf::from(".")
}

impl StepConfig {
    pub fn new(
        name: impl Into<String>,
        command: &[&str],
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.iter().map(|s| s.to_string()).collect(),
            working_dir: working_dir.into(),
            resources: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    fn to_step(&self, base: &Path) -> BuildStep {
        let mut step = BuildStep::new(
            self.name.clone(),
            self.command.iter().cloned(),
            resolve(base, &self.working_dir),
        );
        for resource in &self.resources {
            step = step.with_resource(resolve(base, resource));
        }
        for (key, value) in &self.env {
            step = step.with_env(key.clone(), value.clone());
        }
        step
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else if path == Path::new(".") {
        base.to_path_buf()
    } else {
        base.join(path)
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&contents).map_err(|e| {
            Error::ConfigError(format!("Failed to parse {}: {e}", path.display()))
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        tracing::debug!("Loaded {} step(s) from {}", config.steps.len(), path.display());
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn find_config_file(start_path: &Path) -> Option<PathBuf> {
        let mut current = if start_path.is_file() {
            start_path.parent()?
        } else {
            start_path
        };

        loop {
            for name in CONFIG_FILE_NAMES {
                let config_path = current.join(name);
                if config_path.is_file() {
                    return Some(config_path);
                }
            }
            current = current.parent()?;
        }
    }

    /// Load the nearest config file above `start`, or the built-in
    /// back-end/front-end sequence rooted at `start` when there is none.
    pub fn discover(start: &Path) -> Result<Self> {
        match Self::find_config_file(start) {
            Some(path) => Self::load_from_file(&path),
            None => {
                tracing::debug!("No config file above {}, using defaults", start.display());
                Ok(Self::default_for(start))
            }
        }
    }

    pub fn default_for(root: &Path) -> Self {
        Self {
            steps: defaults::default_steps(),
            base_dir: Some(root.to_path_buf()),
            ..Self::default()
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Turn the configured steps into runnable [`BuildStep`]s, in file order.
    pub fn build_steps(&self) -> Result<Vec<BuildStep>> {
        let base = self.base_dir();
        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(Error::ConfigError(format!(
                    "Duplicate step name '{}'",
                    step.name
                )));
            }
            steps.push(step.to_step(&base));
        }

        if steps.is_empty() {
            return Err(Error::ConfigError("No steps configured".to_string()));
        }
        Ok(steps)
    }

    pub fn run_options(&self) -> RunOptions {
        let mut options = RunOptions::default()
            .with_timeout(
                self.timeout_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            )
            .with_stdio(if self.inherit_output {
                StdioMode::Inherit
            } else {
                StdioMode::Capture
            });
        if let Some(ms) = self.grace_period_ms {
            options = options.with_grace_period(Duration::from_millis(ms));
        }
        if let Some(bytes) = self.output_limit_bytes {
            options = options.with_output_limit(bytes);
        }
        options
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            continue_on_error: self.continue_on_error,
            parallel: self.parallel,
            only: None,
        }
    }
}
