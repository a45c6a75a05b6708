//! The unit of work: a named command run in a working directory

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::StepError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
    pub name: String,
    /// Program followed by its arguments. Never passed through a shell.
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    /// Paths this step reads or writes; used to decide what may run in parallel.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
}

impl BuildStep {
    pub fn new<I, S>(name: impl Into<String>, command: I, working_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
            working_dir: working_dir.into(),
            resources: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn with_resource(mut self, path: impl Into<PathBuf>) -> Self {
        self.resources.push(path.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Check everything that can be known before a process is started.
    pub fn validate(&self) -> Result<(), StepError> {
        if self.name.trim().is_empty() {
            return Err(StepError::configuration("<unnamed>", "step name is empty"));
        }

        match self.program() {
            None => {
                return Err(StepError::configuration(&self.name, "command is empty"));
            }
            Some(program) if program.trim().is_empty() => {
                return Err(StepError::configuration(&self.name, "program name is blank"));
            }
            Some(_) => {}
        }

        if !self.working_dir.exists() {
            return Err(StepError::missing_dir(&self.name, &self.working_dir));
        }
        if !self.working_dir.is_dir() {
            return Err(StepError::configuration(
                &self.name,
                format!(
                    "working directory {} is not a directory",
                    self.working_dir.display()
                ),
            ));
        }

        Ok(())
    }

    /// Render the command for display. The result is never executed.
    pub fn to_shell_command(&self) -> String {
        let mut cmd = String::new();
        for (i, arg) in self.command.iter().enumerate() {
            if i > 0 {
                cmd.push(' ');
            }
            let needs_quotes = arg.is_empty()
                || arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"');
            if needs_quotes {
                cmd.push_str(&format!("'{}'", arg.replace('\'', r"'\''")));
            } else {
                cmd.push_str(arg);
            }
        }
        cmd
    }

    /// Whether this step and `other` may touch the same files.
    ///
    /// A step that declares no resources is assumed to touch everything.
    pub fn touches(&self, other: &BuildStep) -> bool {
        if self.resources.is_empty() || other.resources.is_empty() {
            return true;
        }
        self.resources.iter().any(|mine| {
            other
                .resources
                .iter()
                .any(|theirs| mine.starts_with(theirs) || theirs.starts_with(mine))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_ok() {
        let dir = TempDir::new().unwrap();
        let step = BuildStep::new("back-end", ["echo", "ok"], dir.path());
        assert!(step.validate().is_ok());
        assert_eq!(step.program(), Some("echo"));
        assert_eq!(step.args(), ["ok".to_string()]);
    }

    #[test]
    fn test_validate_empty_command() {
        let dir = TempDir::new().unwrap();
        let step = BuildStep::new("front-end", Vec::<String>::new(), dir.path());
        let err = step.validate().unwrap_err();
        assert!(matches!(err, StepError::Configuration { .. }));
        assert!(err.to_string().contains("command is empty"));

        let step = BuildStep::new("front-end", ["  "], dir.path());
        assert!(step.validate().is_err());
    }

    #[test]
    fn test_validate_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("frontend");
        let step = BuildStep::new("front-end", ["npm", "run", "build"], &missing);
        let err = step.validate().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_validate_dir_is_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("build.py");
        std::fs::write(&file, "").unwrap();
        let step = BuildStep::new("back-end", ["go", "build"], &file);
        let err = step.validate().unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
    }

    #[test]
    fn test_validate_blank_name() {
        let dir = TempDir::new().unwrap();
        let step = BuildStep::new(" ", ["true"], dir.path());
        assert!(step.validate().is_err());
    }

    #[test]
    fn test_to_shell_command_quotes() {
        let step = BuildStep::new(
            "pkg",
            ["pkg", "-t", "node14-win-amd64", "--public-packages", "*", "it's here", ""],
            ".",
        );
        assert_eq!(
            step.to_shell_command(),
            r"pkg -t node14-win-amd64 --public-packages * 'it'\''s here' ''"
        );
    }

    #[test]
    fn test_touches() {
        let backend =
            BuildStep::new("back-end", ["go", "build"], "backend").with_resource("backend");
        let frontend = BuildStep::new("front-end", ["npm", "run", "build"], "frontend")
            .with_resource("frontend");
        let dist = BuildStep::new("bundle", ["tar"], ".").with_resource("frontend/dist");
        let anything = BuildStep::new("clean", ["rm"], ".");

        assert!(!backend.touches(&frontend));
        assert!(frontend.touches(&dist));
        assert!(dist.touches(&frontend));
        assert!(anything.touches(&backend));
        assert!(backend.touches(&anything));
    }
}
