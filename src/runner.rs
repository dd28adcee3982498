//! High-level runner API for the benchmark coordinator.
//!
//! This module provides a simplified public interface that encapsulates all
//! the internal setup of plans, launchers, report storage, and progress
//! tracking.
//!
//! This is the primary API for external users and for the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use tokio::sync::mpsc;

use crate::config::{ANALYZE_SCRIPT, UPLOAD_SCRIPT};
use crate::coordination::report::LocalReportStorage;
use crate::coordination::{Coordinator, RunConfigBuilder};
use crate::exec::{ProcessLauncher, TokioProcessLauncher};
use crate::plan::{self, PlanParams};
use crate::telemetry;

pub use crate::exec::LaunchOutcome;
pub use crate::plan::{check_model_paths, upload_invocation, Invocation, PathProblem, RunDescriptor};

/// Arguments for running a benchmark batch
#[derive(Debug, Clone)]
pub struct BenchArgs {
    /// Configuration file gating upload/analysis (its schema is opaque here)
    pub config_file: PathBuf,
    pub models_dir: PathBuf,
    pub results_dir: PathBuf,
    pub bench_name: String,
    pub temperature: f64,
    pub dtype: String,
    /// Restrict the plan to these variants; `None` runs the full table
    pub only: Option<Vec<String>>,
    /// GPU selection forwarded to inference children
    pub devices: Option<String>,
    /// Suppress progress bars
    pub quiet: bool,
}

/// Result of a completed benchmark batch
#[derive(Debug)]
pub struct BenchOutcome {
    pub run_id: String,
    pub variants_total: usize,
    pub completed: usize,
    pub reused: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration: Duration,
    /// Where the run report was written
    pub report_path: PathBuf,
}

impl BenchArgs {
    fn plan_params(&self) -> PlanParams {
        PlanParams {
            models_dir: self.models_dir.clone(),
            results_dir: self.results_dir.clone(),
            bench_name: self.bench_name.clone(),
            temperature: self.temperature,
            dtype: self.dtype.clone(),
        }
    }
}

/// Build the run plan for the given arguments
///
/// Exposed separately so the CLI can print the plan for `--dry-run` and
/// `check` without executing anything.
pub fn build_plan(args: &BenchArgs) -> Result<Vec<RunDescriptor>> {
    let plan = plan::default_plan(&args.plan_params());
    match &args.only {
        Some(only) => plan::filter_plan(plan, only),
        None => Ok(plan),
    }
}

/// Run a benchmark batch with the specified arguments
///
/// This is the main entry point. It handles all the internal setup:
/// - Building and filtering the run plan
/// - Wiring the subprocess launcher and report storage
/// - Progress tracking over a telemetry channel (unless quiet)
/// - Driving the coordinator across every descriptor
pub async fn run_bench(args: BenchArgs) -> Result<BenchOutcome> {
    let plan = build_plan(&args)?;
    ensure!(!plan.is_empty(), "Run plan is empty");
    let params = args.plan_params();

    // The baseline artifact lives at the vanilla variant's deterministic
    // path whether or not the baseline is part of this batch.
    let baseline_artifact = baseline_artifact_path(&args)?;

    let run_config = RunConfigBuilder::default()
        .config_file(args.config_file.clone())
        .results_dir(args.results_dir.clone())
        .bench_name(args.bench_name.clone())
        .tokenizer_path(params.base_model_path())
        .baseline_artifact(baseline_artifact)
        .devices(args.devices.clone())
        .build()
        .context("Failed to build run configuration")?;

    let launcher: Arc<dyn ProcessLauncher> = Arc::new(TokioProcessLauncher);
    let report_storage = Arc::new(LocalReportStorage::new(args.results_dir.clone()));

    let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel();
    let progress_handle = if args.quiet {
        drop(telemetry_rx);
        None
    } else {
        Some(telemetry::spawn_progress_task(plan.len() as u64, telemetry_rx))
    };

    let coordinator = Coordinator::new(launcher, report_storage, telemetry_tx);
    let summary = coordinator.run_batch(&run_config, &plan).await?;

    // Wait for the progress bars to finish so we don't collide output
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let report_path = args
        .results_dir
        .join("runs")
        .join(&summary.run_id)
        .join("report.json");

    Ok(BenchOutcome {
        run_id: summary.run_id,
        variants_total: summary.total,
        completed: summary.completed,
        reused: summary.reused,
        skipped: summary.skipped,
        failed: summary.failed,
        duration: summary.duration,
        report_path,
    })
}

/// Deterministic path of the baseline artifact for these arguments
fn baseline_artifact_path(args: &BenchArgs) -> Result<PathBuf> {
    let full_plan = plan::default_plan(&args.plan_params());
    let baseline = full_plan
        .iter()
        .find(|d| d.is_baseline)
        .context("Variant table has no baseline entry")?;
    Ok(baseline.artifact_path.clone())
}

/// Preflight status of one variant
#[derive(Debug)]
pub struct VariantPreflight {
    pub variant: String,
    pub is_baseline: bool,
    /// Model paths that failed their precondition check
    pub path_problems: Vec<(PathBuf, PathProblem)>,
    /// Whether this variant's result artifact already exists
    pub artifact_exists: bool,
}

impl VariantPreflight {
    pub fn runnable(&self) -> bool {
        self.path_problems.is_empty()
    }
}

/// Preflight status of the whole setup
#[derive(Debug)]
pub struct PreflightReport {
    pub config_file: PathBuf,
    pub config_file_present: bool,
    /// Collaborator entry points and whether they resolve on disk
    pub collaborators: Vec<(String, bool)>,
    pub variants: Vec<VariantPreflight>,
}

impl PreflightReport {
    /// The batch is worth starting only if the baseline variant can run
    pub fn baseline_ok(&self) -> bool {
        self.variants
            .iter()
            .any(|v| v.is_baseline && v.runnable())
    }
}

/// Check local prerequisites without invoking anything
///
/// Covers the configuration file, every variant's model paths, and the
/// collaborator scripts. Purely local: no network probing, no subprocesses.
pub fn preflight(args: &BenchArgs) -> Result<PreflightReport> {
    let plan = build_plan(args)?;

    let variants = plan
        .iter()
        .map(|d| VariantPreflight {
            variant: d.variant.clone(),
            is_baseline: d.is_baseline,
            path_problems: check_model_paths(&d.model_paths),
            artifact_exists: d.artifact_path.exists(),
        })
        .collect();

    let collaborators = [UPLOAD_SCRIPT, ANALYZE_SCRIPT]
        .into_iter()
        .map(|script| (script.to_string(), Path::new(script).exists()))
        .collect();

    Ok(PreflightReport {
        config_file: args.config_file.clone(),
        config_file_present: args.config_file.exists(),
        collaborators,
        variants,
    })
}

/// Invoke the upload collaborator for a single existing artifact
///
/// Unlike the batch pipeline, a missing configuration file is an error here:
/// the caller asked for exactly this upload, so there is nothing to degrade
/// to.
pub async fn upload_artifact(
    config_file: &Path,
    artifact: &Path,
    model_id: &str,
) -> Result<LaunchOutcome> {
    ensure!(
        artifact.exists(),
        "Result artifact not found: {}",
        artifact.display()
    );
    ensure!(
        config_file.exists(),
        "Configuration file not found: {}",
        config_file.display()
    );

    let invocation = upload_invocation(config_file, artifact, model_id);
    TokioProcessLauncher.launch(&invocation).await
}
