//! The stock sequence used when a project has no config file: build the Go
//! back end into `dist/`, then the front end with its npm build script.

use std::path::PathBuf;

use super::StepConfig;

pub const BACK_END: &str = "back-end";
pub const FRONT_END: &str = "front-end";

pub fn default_steps() -> Vec<StepConfig> {
    vec![
        StepConfig {
            resources: vec![PathBuf::from("backend"), PathBuf::from("dist")],
            ..StepConfig::new(BACK_END, &["go", "build", "-o", "../dist/", "./..."], "backend")
        },
        StepConfig {
            resources: vec![PathBuf::from("frontend")],
            ..StepConfig::new(FRONT_END, &["npm", "run", "build"], "frontend")
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_end_runs_first() {
        let steps = default_steps();
        assert_eq!(steps[0].name, BACK_END);
        assert_eq!(steps[1].name, FRONT_END);
    }

    #[test]
    fn test_default_steps_do_not_share_resources() {
        let steps = default_steps();
        for a in &steps[0].resources {
            for b in &steps[1].resources {
                assert!(!a.starts_with(b) && !b.starts_with(a));
            }
        }
    }
}
