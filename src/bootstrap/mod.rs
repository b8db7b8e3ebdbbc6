use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tempfile::TempDir;

/// Pinned release of the constraint solver fetched by `slick bootstrap`.
pub const SOLVER_VERSION: &str = "5.6.2";

const SOLVER_URL: &str = "https://github.com/potassco/clingo/archive/v5.6.2.tar.gz";

/// An active virtual environment: the installation prefix for the solver.
#[derive(Debug, Clone)]
pub struct VirtualEnv {
    prefix: PathBuf,
}

impl VirtualEnv {
    /// Detect the active environment from `VIRTUAL_ENV`.
    pub fn detect() -> Result<Self> {
        let Some(prefix) = std::env::var_os("VIRTUAL_ENV") else {
            bail!("no active virtual environment (VIRTUAL_ENV is unset); activate one and retry");
        };
        Self::from_prefix(PathBuf::from(prefix))
    }

    /// Validate a prefix: it must contain an interpreter at `bin/python`.
    pub fn from_prefix(prefix: PathBuf) -> Result<Self> {
        let python = prefix.join("bin").join("python");
        if !python.is_file() {
            bail!(
                "{} does not look like a virtual environment ({} is missing)",
                prefix.display(),
                python.display()
            );
        }
        Ok(VirtualEnv { prefix })
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }
}

/// One external command in the bootstrap pipeline.
#[derive(Debug, Clone)]
pub struct Step {
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
}

impl Step {
    pub fn new(label: &str, program: &str, args: &[&str]) -> Self {
        Step {
            label: label.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// The command sequence run inside a scratch directory.
#[derive(Debug, Clone)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    /// Download, extract, configure, and build/install the solver into the
    /// environment prefix, with an out-of-tree build directory.
    pub fn for_env(env: &VirtualEnv) -> Plan {
        let src_dir = format!("clingo-{}", SOLVER_VERSION);
        let prefix_arg = format!("-DCMAKE_INSTALL_PREFIX={}", env.prefix().display());
        Plan {
            steps: vec![
                Step::new(
                    "download",
                    "curl",
                    &["-fsSL", "-o", "solver.tar.gz", SOLVER_URL],
                ),
                Step::new("extract", "tar", &["xzf", "solver.tar.gz"]),
                Step::new(
                    "configure",
                    "cmake",
                    &[
                        "-S",
                        &src_dir,
                        "-B",
                        "build",
                        "-DCMAKE_BUILD_TYPE=Release",
                        &prefix_arg,
                    ],
                ),
                Step::new("install", "cmake", &["--build", "build", "--target", "install"]),
            ],
        }
    }
}

/// Run the plan in a scratch directory that is removed afterwards, success
/// or failure.
///
/// Returns the exit code of the last step that ran: a failing step stops
/// the pipeline and its code is the one reported, so the caller's exit
/// status reflects the build step, not the cleanup.
pub fn run(plan: &Plan) -> Result<i32> {
    let work = TempDir::new().context("failed to create scratch directory")?;
    let code = run_in(plan, work.path());
    // The TempDir is removed here whether the pipeline succeeded or not.
    drop(work);
    code
}

/// Run the plan's steps sequentially with the given working directory.
pub fn run_in(plan: &Plan, work: &Path) -> Result<i32> {
    for step in &plan.steps {
        eprintln!("[bootstrap] {}", step.label);
        let status = Command::new(&step.program)
            .args(&step.args)
            .current_dir(work)
            .status()
            .with_context(|| format!("failed to run {} step ({})", step.label, step.program))?;
        if !status.success() {
            return Ok(status.code().unwrap_or(1));
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sh(label: &str, script: &str) -> Step {
        Step::new(label, "sh", &["-c", script])
    }

    fn fake_venv() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin/python"), "#!/bin/sh\n").unwrap();
        dir
    }

    #[test]
    fn test_from_prefix_requires_interpreter() {
        let dir = TempDir::new().unwrap();
        let err = VirtualEnv::from_prefix(dir.path().to_path_buf()).unwrap_err();
        assert!(err.to_string().contains("virtual environment"));
    }

    #[test]
    fn test_from_prefix_accepts_venv() {
        let dir = fake_venv();
        let env = VirtualEnv::from_prefix(dir.path().to_path_buf()).unwrap();
        assert_eq!(env.prefix(), dir.path());
    }

    #[test]
    fn test_plan_targets_prefix() {
        let dir = fake_venv();
        let env = VirtualEnv::from_prefix(dir.path().to_path_buf()).unwrap();
        let plan = Plan::for_env(&env);
        assert_eq!(plan.steps.len(), 4);
        let configure = &plan.steps[2];
        assert!(configure
            .args
            .iter()
            .any(|a| a.contains("-DCMAKE_INSTALL_PREFIX=")));
    }

    #[test]
    fn test_pipeline_stops_at_first_failure() {
        let probe = TempDir::new().unwrap();
        let before = probe.path().join("before");
        let after = probe.path().join("after");
        let plan = Plan {
            steps: vec![
                sh("first", &format!("touch {}", before.display())),
                sh("fail", "exit 5"),
                sh("third", &format!("touch {}", after.display())),
            ],
        };
        let code = run(&plan).unwrap();
        assert_eq!(code, 5);
        assert!(before.exists());
        assert!(!after.exists());
    }

    #[test]
    fn test_pipeline_success_is_zero() {
        let plan = Plan {
            steps: vec![sh("ok", "true"), sh("also-ok", "true")],
        };
        assert_eq!(run(&plan).unwrap(), 0);
    }

    #[test]
    fn test_scratch_dir_removed_on_failure() {
        let probe = TempDir::new().unwrap();
        let recorded = probe.path().join("workdir");
        // Record the scratch path, then fail the build step.
        let plan = Plan {
            steps: vec![
                sh("record", &format!("pwd > {}", recorded.display())),
                sh("fail", "exit 7"),
            ],
        };
        let code = run(&plan).unwrap();
        assert_eq!(code, 7);

        let work = fs::read_to_string(&recorded).unwrap();
        assert!(!Path::new(work.trim()).exists());
    }

    #[test]
    fn test_scratch_dir_removed_on_success() {
        let probe = TempDir::new().unwrap();
        let recorded = probe.path().join("workdir");
        let plan = Plan {
            steps: vec![sh("record", &format!("pwd > {}", recorded.display()))],
        };
        assert_eq!(run(&plan).unwrap(), 0);

        let work = fs::read_to_string(&recorded).unwrap();
        assert!(!Path::new(work.trim()).exists());
    }
}
