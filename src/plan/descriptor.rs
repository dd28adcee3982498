use std::path::{Path, PathBuf};

use crate::config::{ANALYZE_SCRIPT, PLACEHOLDER_PREFIX, PYTHON_PROGRAM, UPLOAD_SCRIPT};

/// A single external-command invocation: program, arguments, extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl Invocation {
    /// Start building an invocation for the given program
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Append a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument (lossy UTF-8 conversion)
    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Set an environment variable on the child process
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Render the command line for logging and dry-run output
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// One benchmark variant to execute
///
/// Descriptors are created from the static variant table before execution and
/// are immutable during a run. The artifact path is fully determined by the
/// variant name and the fixed benchmark parameters, which is what makes
/// re-running idempotent: an existing artifact means the work is already done.
#[derive(Debug, Clone)]
pub struct RunDescriptor {
    /// Short variant name ("vanilla", "sps", ...)
    pub variant: String,
    /// Full run identifier, also the artifact file stem
    pub model_id: String,
    /// Where the inference runner leaves its line-delimited results
    pub artifact_path: PathBuf,
    /// How to launch the inference runner for this variant
    pub inference: Invocation,
    /// Model/checkpoint paths that must exist before this variant can run
    pub model_paths: Vec<PathBuf>,
    /// Whether this is the designated reference run
    pub is_baseline: bool,
    /// Whether a speed comparison against the baseline applies
    pub speed_analysis: bool,
}

/// Why a model path failed its precondition check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathProblem {
    /// The path still carries the `/path/to` sample-config marker
    Placeholder,
    /// The path does not exist on disk
    Missing,
}

impl std::fmt::Display for PathProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathProblem::Placeholder => write!(f, "is an unconfigured placeholder"),
            PathProblem::Missing => write!(f, "does not exist"),
        }
    }
}

/// Check a descriptor's model-path preconditions
///
/// Placeholder detection runs before the existence check so an unconfigured
/// sample path is reported as such instead of as a missing file.
pub fn check_model_paths(paths: &[PathBuf]) -> Vec<(PathBuf, PathProblem)> {
    let mut problems = Vec::new();
    for path in paths {
        if is_placeholder(path) {
            problems.push((path.clone(), PathProblem::Placeholder));
        } else if !path.exists() {
            problems.push((path.clone(), PathProblem::Missing));
        }
    }
    problems
}

fn is_placeholder(path: &Path) -> bool {
    path.to_string_lossy().starts_with(PLACEHOLDER_PREFIX)
}

/// Build the upload collaborator invocation for one artifact
pub fn upload_invocation(config_file: &Path, artifact: &Path, model_id: &str) -> Invocation {
    Invocation::new(PYTHON_PROGRAM)
        .arg(UPLOAD_SCRIPT)
        .arg("--config")
        .arg_path(config_file)
        .arg("--single-file")
        .arg_path(artifact)
        .arg("--model-name")
        .arg(model_id)
}

/// Build the speed-analysis collaborator invocation
///
/// The analyzer compares the candidate artifact against the baseline artifact
/// and records the comparison under the run identifier.
pub fn analyze_invocation(
    config_file: &Path,
    model_id: &str,
    artifact: &Path,
    baseline_artifact: &Path,
    tokenizer_path: &Path,
) -> Invocation {
    Invocation::new(PYTHON_PROGRAM)
        .arg(ANALYZE_SCRIPT)
        .arg("--config")
        .arg_path(config_file)
        .arg("--model-name")
        .arg(model_id)
        .arg("--model-file")
        .arg_path(artifact)
        .arg("--baseline-file")
        .arg_path(baseline_artifact)
        .arg("--tokenizer-path")
        .arg_path(tokenizer_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_detected_before_existence() {
        let paths = vec![PathBuf::from("/path/to/vicuna-7b-v1.3")];
        let problems = check_model_paths(&paths);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].1, PathProblem::Placeholder);
    }

    #[test]
    fn test_missing_path_detected() {
        let paths = vec![PathBuf::from("/nonexistent/models/vicuna-7b-v1.3")];
        let problems = check_model_paths(&paths);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].1, PathProblem::Missing);
    }

    #[test]
    fn test_existing_path_passes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().to_path_buf()];
        assert!(check_model_paths(&paths).is_empty());
    }

    #[test]
    fn test_upload_invocation_args() {
        let inv = upload_invocation(
            Path::new("config.yaml"),
            Path::new("data/out/model-a.jsonl"),
            "model-a",
        );
        assert_eq!(inv.program, "python3");
        assert_eq!(
            inv.args,
            vec![
                "upload_results.py",
                "--config",
                "config.yaml",
                "--single-file",
                "data/out/model-a.jsonl",
                "--model-name",
                "model-a",
            ]
        );
    }

    #[test]
    fn test_analyze_invocation_args() {
        let inv = analyze_invocation(
            Path::new("config.yaml"),
            "model-a",
            Path::new("data/out/model-a.jsonl"),
            Path::new("data/out/baseline.jsonl"),
            Path::new("models/vicuna-7b-v1.3"),
        );
        assert_eq!(inv.program, "python3");
        assert_eq!(
            inv.args,
            vec![
                "speed_mlflow.py",
                "--config",
                "config.yaml",
                "--model-name",
                "model-a",
                "--model-file",
                "data/out/model-a.jsonl",
                "--baseline-file",
                "data/out/baseline.jsonl",
                "--tokenizer-path",
                "models/vicuna-7b-v1.3",
            ]
        );
    }

    #[test]
    fn test_display_line() {
        let inv = Invocation::new("python3").arg("-m").arg("evaluation.inference_pld");
        assert_eq!(inv.display_line(), "python3 -m evaluation.inference_pld");
    }
}
