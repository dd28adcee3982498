//! Configuration constants for the benchmark runner
//!
//! This module centralizes all tunable parameters and conventions used
//! throughout the application.

// ============================================================================
// Collaborator Conventions
// ============================================================================

/// Interpreter used to launch the Python collaborator scripts
pub const PYTHON_PROGRAM: &str = "python3";

/// Entry point of the upload collaborator (artifact store push)
pub const UPLOAD_SCRIPT: &str = "upload_results.py";

/// Entry point of the speed-analysis collaborator (experiment tracker)
pub const ANALYZE_SCRIPT: &str = "speed_mlflow.py";

/// Default configuration file gating upload and speed-analysis
///
/// The file's schema is opaque to the coordinator; only its presence matters
/// here. The collaborators parse it themselves.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

// ============================================================================
// Benchmark Defaults
// ============================================================================

/// Benchmark suite name passed to every inference runner
pub const DEFAULT_BENCH_NAME: &str = "spec_bench";

/// Sampling temperature for all runs
///
/// 0.0 forces greedy decoding so repeated runs of the same variant produce
/// comparable timing data.
pub const DEFAULT_TEMPERATURE: f64 = 0.0;

/// Numeric precision passed to the inference runners
pub const DEFAULT_DTYPE: &str = "float16";

/// Directory where inference runners leave their result artifacts
pub const DEFAULT_RESULTS_DIR: &str = "data/spec_bench/model_answer";

/// Default root directory for model checkpoints
pub const DEFAULT_MODELS_DIR: &str = "models";

/// Directory for per-invocation log files
pub const DEFAULT_LOG_DIR: &str = "logs";

// ============================================================================
// Environment
// ============================================================================

/// Environment variable overriding the models root directory
pub const MODELS_DIR_ENV: &str = "SPEC_BENCH_MODELS_DIR";

/// Environment variable forwarded to inference children to select GPUs
pub const DEVICES_ENV: &str = "CUDA_VISIBLE_DEVICES";

// ============================================================================
// Process Behavior
// ============================================================================

/// Path prefix marking an unconfigured model path in sample configs
///
/// Sample setups ship `/path/to/<model>` markers; a descriptor whose model
/// path still carries the marker is skipped rather than treated as a missing
/// file.
pub const PLACEHOLDER_PREFIX: &str = "/path/to";

/// Exit status used when the coordinator is interrupted by a signal
///
/// 130 is the conventional status for a process ended by SIGINT (128 + 2).
pub const INTERRUPT_EXIT_CODE: i32 = 130;
