use buildstep_core::{BuildStep, StepReport, StepState};

/// One line announcing how a step ended.
pub fn step_line(entry: &StepReport<'_>) -> String {
    let duration = entry
        .outcome
        .as_ref()
        .and_then(|o| o.as_ref().ok())
        .map(|o| format!(" in {:.2}s", o.duration().as_secs_f64()))
        .unwrap_or_default();

    match entry.state {
        StepState::Succeeded => format!("✅ {} succeeded{}", entry.name(), duration),
        StepState::Failed => format!(
            "❌ {} failed with exit code {}{}",
            entry.name(),
            entry.exit_code.unwrap_or(-1),
            duration
        ),
        StepState::TimedOut => format!("⏱️  {} timed out{}", entry.name(), duration),
        StepState::Cancelled => format!("🚫 {} cancelled{}", entry.name(), duration),
        StepState::LaunchError => format!("⚠️  {} could not be launched", entry.name()),
        StepState::ConfigurationError => format!("⚠️  {} is misconfigured", entry.name()),
        StepState::Pending | StepState::Launching | StepState::Running => {
            format!("⏭️  {} skipped", entry.name())
        }
    }
}

/// Lines for `--list`: name, directory and command of every step.
pub fn step_listing(steps: &[BuildStep]) -> Vec<String> {
    let width = steps.iter().map(|s| s.name.len()).max().unwrap_or(0);
    steps
        .iter()
        .map(|s| {
            format!(
                "{:<width$}  {}  ({})",
                s.name,
                s.to_shell_command(),
                s.working_dir.display(),
                width = width
            )
        })
        .collect()
}

/// Lines for `--dry-run`: each wave with the commands it would launch.
pub fn plan_lines(waves: &[Vec<&BuildStep>]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, wave) in waves.iter().enumerate() {
        let mode = if wave.len() > 1 { " (parallel)" } else { "" };
        lines.push(format!("📋 Wave {}{}:", i + 1, mode));
        for step in wave {
            lines.push(format!("   • {}: {}", step.name, step.to_shell_command()));
            lines.push(format!("     📂 {}", step.working_dir.display()));
            for (key, value) in &step.env {
                lines.push(format!("     🌍 {}={}", key, value));
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps() -> Vec<BuildStep> {
        vec![
            BuildStep::new("back-end", ["go", "build", "./..."], "backend")
                .with_env("CGO_ENABLED", "0"),
            BuildStep::new("front-end", ["npm", "run", "build"], "frontend"),
        ]
    }

    #[test]
    fn test_step_listing_aligns_names() {
        let lines = step_listing(&steps());
        assert_eq!(lines[0], "back-end   go build ./...  (backend)");
        assert_eq!(lines[1], "front-end  npm run build  (frontend)");
    }

    #[test]
    fn test_plan_lines() {
        let steps = steps();
        let waves = vec![vec![&steps[0], &steps[1]]];
        let lines = plan_lines(&waves);
        assert_eq!(lines[0], "📋 Wave 1 (parallel):");
        assert_eq!(lines[1], "   • back-end: go build ./...");
        assert_eq!(lines[3], "     🌍 CGO_ENABLED=0");
        assert_eq!(lines[4], "   • front-end: npm run build");
    }
}
