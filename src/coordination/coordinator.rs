use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use derive_builder::Builder;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::report::{
    DescriptorReport, ReportStorage, RunOutcome, RunReportFile, StepStatus,
};
use crate::config::DEVICES_ENV;
use crate::exec::ProcessLauncher;
use crate::plan::{analyze_invocation, check_model_paths, upload_invocation, Invocation, RunDescriptor};
use crate::telemetry::{RunEvent, StepKind};

/// Configuration for one coordinator batch
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct RunConfig {
    /// Configuration file whose presence gates upload and speed-analysis
    pub config_file: PathBuf,
    /// Directory where result artifacts live; created if absent
    pub results_dir: PathBuf,
    pub bench_name: String,
    /// Tokenizer reference handed to the speed analyzer
    pub tokenizer_path: PathBuf,
    /// Artifact of the designated reference run
    pub baseline_artifact: PathBuf,
    /// GPU selection forwarded to inference children via CUDA_VISIBLE_DEVICES
    #[builder(default)]
    pub devices: Option<String>,
}

/// Result of a completed coordinator batch
#[derive(Debug)]
pub struct BatchSummary {
    pub run_id: String,
    pub total: usize,
    pub completed: usize,
    pub reused: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration: Duration,
    /// Detailed per-descriptor results (also persisted in the run report)
    pub reports: Vec<DescriptorReport>,
}

/// The Coordinator drives the batch of benchmark variants.
///
/// Each descriptor runs a sequential pipeline: precondition check, then
/// reuse-or-infer, then upload, then speed-analysis. No failure in one
/// descriptor stops the batch; every outcome is logged and recorded in the
/// run report.
pub struct Coordinator {
    launcher: Arc<dyn ProcessLauncher>,
    report_storage: Arc<dyn ReportStorage>,
    telemetry_tx: mpsc::UnboundedSender<RunEvent>,
}

impl Coordinator {
    /// Create a new Coordinator instance
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        report_storage: Arc<dyn ReportStorage>,
        telemetry_tx: mpsc::UnboundedSender<RunEvent>,
    ) -> Self {
        Self {
            launcher,
            report_storage,
            telemetry_tx,
        }
    }

    /// Run the full batch of descriptors
    ///
    /// This method orchestrates the entire run:
    /// 1. Generate unique run ID
    /// 2. Ensure the results directory exists
    /// 3. Execute each descriptor's pipeline in plan order
    /// 4. Write the run report
    /// 5. Aggregate the batch summary
    pub async fn run_batch(
        &self,
        config: &RunConfig,
        plan: &[RunDescriptor],
    ) -> Result<BatchSummary> {
        let start_instant = Instant::now();
        let started_at = Utc::now();

        let run_id = Uuid::new_v4().to_string();
        info!("Starting benchmark run: {} ({} variants)", run_id, plan.len());

        fs::create_dir_all(&config.results_dir)
            .await
            .context("Failed to create results directory")?;

        let mut reports = Vec::with_capacity(plan.len());
        for descriptor in plan {
            let report = self.run_descriptor(config, descriptor).await;
            let _ = self.telemetry_tx.send(RunEvent::DescriptorFinished {
                outcome: report.outcome,
                reused_artifact: report.reused_artifact,
            });
            reports.push(report);
        }

        let duration = start_instant.elapsed();
        let report_file = RunReportFile {
            run_id: run_id.clone(),
            bench_name: config.bench_name.clone(),
            started_at: started_at.to_rfc3339(),
            completed_at: Utc::now().to_rfc3339(),
            duration_secs: duration.as_secs(),
            descriptors: reports.clone(),
        };

        // A report that cannot be written must not fail the batch it records
        if let Err(e) = self.report_storage.write_report(&run_id, &report_file).await {
            warn!("Failed to write run report: {:#}", e);
        }

        let summary = Self::summarize(run_id, reports, duration);
        info!(
            "Run complete: {} variants, {} completed ({} reused), {} skipped, {} failed in {:.1}s",
            summary.total,
            summary.completed,
            summary.reused,
            summary.skipped,
            summary.failed,
            summary.duration.as_secs_f64()
        );

        Ok(summary)
    }

    /// Execute one descriptor's pipeline; never fails the batch
    async fn run_descriptor(
        &self,
        config: &RunConfig,
        descriptor: &RunDescriptor,
    ) -> DescriptorReport {
        let _ = self.telemetry_tx.send(RunEvent::DescriptorStarted {
            variant: descriptor.variant.clone(),
        });
        let started_at = Utc::now();
        let start_instant = Instant::now();

        info!(
            "Variant {}: starting (model id: {})",
            descriptor.variant, descriptor.model_id
        );

        // 1. Model-path preconditions
        let problems = check_model_paths(&descriptor.model_paths);
        if !problems.is_empty() {
            for (path, problem) in &problems {
                warn!(
                    "Variant {}: model path {} {}",
                    descriptor.variant,
                    path.display(),
                    problem
                );
            }
            warn!(
                "Variant {}: skipping, {} model path(s) unusable",
                descriptor.variant,
                problems.len()
            );
            let skipped = StepStatus::skipped("model preconditions not met");
            return self.finish_report(
                descriptor,
                RunOutcome::Skipped,
                false,
                skipped.clone(),
                skipped.clone(),
                skipped,
                started_at,
                start_instant,
            );
        }

        // 2./3. Reuse the artifact if present, otherwise run inference
        let reused = descriptor.artifact_path.exists();
        let inference_status = if reused {
            info!(
                "Variant {}: result artifact already present at {}, skipping inference",
                descriptor.variant,
                descriptor.artifact_path.display()
            );
            StepStatus::skipped("result artifact already present")
        } else {
            let mut invocation = descriptor.inference.clone();
            if let Some(devices) = &config.devices {
                invocation = invocation.env(DEVICES_ENV, devices.clone());
            }
            let status = self
                .run_step(descriptor, StepKind::Inference, &invocation)
                .await;
            if status.is_failed() {
                let not_reached = StepStatus::skipped("inference did not produce an artifact");
                return self.finish_report(
                    descriptor,
                    RunOutcome::Failed,
                    false,
                    status,
                    not_reached.clone(),
                    not_reached,
                    started_at,
                    start_instant,
                );
            }
            status
        };

        // 4. Upload
        let upload_status = self.run_upload(config, descriptor).await;

        // 5. Speed analysis
        let analysis_status = self.run_analysis(config, descriptor).await;

        self.finish_report(
            descriptor,
            RunOutcome::Completed,
            reused,
            inference_status,
            upload_status,
            analysis_status,
            started_at,
            start_instant,
        )
    }

    /// Upload the artifact unless the configuration file is absent
    async fn run_upload(&self, config: &RunConfig, descriptor: &RunDescriptor) -> StepStatus {
        if let Some(skipped) = self.config_gate(config, descriptor, StepKind::Upload) {
            return skipped;
        }

        let invocation = upload_invocation(
            &config.config_file,
            &descriptor.artifact_path,
            &descriptor.model_id,
        );
        self.run_step(descriptor, StepKind::Upload, &invocation).await
    }

    /// Compare against the baseline unless this run is the baseline itself,
    /// the baseline artifact is missing, or the configuration file is absent
    async fn run_analysis(&self, config: &RunConfig, descriptor: &RunDescriptor) -> StepStatus {
        if !descriptor.speed_analysis {
            return StepStatus::skipped("baseline run");
        }

        if !config.baseline_artifact.exists() {
            warn!(
                "Variant {}: baseline artifact {} not found, skipping speed-analysis",
                descriptor.variant,
                config.baseline_artifact.display()
            );
            return StepStatus::skipped("baseline artifact not found");
        }

        if let Some(skipped) = self.config_gate(config, descriptor, StepKind::Analysis) {
            return skipped;
        }

        let invocation = analyze_invocation(
            &config.config_file,
            &descriptor.model_id,
            &descriptor.artifact_path,
            &config.baseline_artifact,
            &config.tokenizer_path,
        );
        self.run_step(descriptor, StepKind::Analysis, &invocation)
            .await
    }

    /// Skip a gated step when the configuration file is absent
    ///
    /// Checked at step time rather than once at startup so a config file
    /// dropped in place mid-batch takes effect for later descriptors.
    fn config_gate(
        &self,
        config: &RunConfig,
        descriptor: &RunDescriptor,
        step: StepKind,
    ) -> Option<StepStatus> {
        if config.config_file.exists() {
            return None;
        }
        warn!(
            "Variant {}: configuration file {} not found, skipping {}",
            descriptor.variant,
            config.config_file.display(),
            step
        );
        Some(StepStatus::skipped("configuration file not found"))
    }

    /// Launch one collaborator and translate its outcome into a step status
    async fn run_step(
        &self,
        descriptor: &RunDescriptor,
        step: StepKind,
        invocation: &Invocation,
    ) -> StepStatus {
        info!(
            "Variant {}: {}: {}",
            descriptor.variant,
            step,
            invocation.display_line()
        );

        match self.launcher.launch(invocation).await {
            Ok(outcome) if outcome.success() => {
                info!(
                    "Variant {}: {} completed in {:.1}s",
                    descriptor.variant,
                    step,
                    outcome.duration.as_secs_f64()
                );
                let _ = self.telemetry_tx.send(RunEvent::StepFinished {
                    step,
                    success: true,
                    duration_ms: outcome.duration.as_millis() as u64,
                });
                StepStatus::Success
            }
            Ok(outcome) => {
                match outcome.exit_code {
                    Some(code) => warn!(
                        "Variant {}: {} exited with code {} after {:.1}s",
                        descriptor.variant,
                        step,
                        code,
                        outcome.duration.as_secs_f64()
                    ),
                    None => warn!(
                        "Variant {}: {} terminated by signal after {:.1}s",
                        descriptor.variant,
                        step,
                        outcome.duration.as_secs_f64()
                    ),
                }
                let _ = self.telemetry_tx.send(RunEvent::StepFinished {
                    step,
                    success: false,
                    duration_ms: outcome.duration.as_millis() as u64,
                });
                StepStatus::Failed {
                    exit_code: outcome.exit_code,
                }
            }
            Err(e) => {
                warn!("Variant {}: {} failed to launch: {:#}", descriptor.variant, step, e);
                let _ = self.telemetry_tx.send(RunEvent::StepFinished {
                    step,
                    success: false,
                    duration_ms: 0,
                });
                StepStatus::Failed { exit_code: None }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_report(
        &self,
        descriptor: &RunDescriptor,
        outcome: RunOutcome,
        reused_artifact: bool,
        inference: StepStatus,
        upload: StepStatus,
        analysis: StepStatus,
        started_at: chrono::DateTime<Utc>,
        start_instant: Instant,
    ) -> DescriptorReport {
        DescriptorReport {
            variant: descriptor.variant.clone(),
            model_id: descriptor.model_id.clone(),
            artifact_path: descriptor.artifact_path.to_string_lossy().into_owned(),
            outcome,
            reused_artifact,
            inference,
            upload,
            analysis,
            started_at: started_at.to_rfc3339(),
            completed_at: Utc::now().to_rfc3339(),
            duration_secs: start_instant.elapsed().as_secs(),
        }
    }

    fn summarize(run_id: String, reports: Vec<DescriptorReport>, duration: Duration) -> BatchSummary {
        let completed = reports
            .iter()
            .filter(|r| r.outcome == RunOutcome::Completed)
            .count();
        let reused = reports.iter().filter(|r| r.reused_artifact).count();
        let skipped = reports
            .iter()
            .filter(|r| r.outcome == RunOutcome::Skipped)
            .count();
        let failed = reports
            .iter()
            .filter(|r| r.outcome == RunOutcome::Failed)
            .count();

        BatchSummary {
            run_id,
            total: reports.len(),
            completed,
            reused,
            skipped,
            failed,
            duration,
            reports,
        }
    }
}
