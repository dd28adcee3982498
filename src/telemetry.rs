use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::coordination::report::RunOutcome;

/// Which collaborator step an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Inference,
    Upload,
    Analysis,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Inference => write!(f, "inference"),
            StepKind::Upload => write!(f, "upload"),
            StepKind::Analysis => write!(f, "speed-analysis"),
        }
    }
}

/// Telemetry events sent from the coordinator for progress tracking
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A descriptor's pipeline began
    DescriptorStarted { variant: String },
    /// A collaborator invocation finished
    StepFinished {
        step: StepKind,
        success: bool,
        duration_ms: u64,
    },
    /// A descriptor's pipeline ended
    DescriptorFinished {
        outcome: RunOutcome,
        reused_artifact: bool,
    },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub descriptors_started: usize,
    pub descriptors_finished: usize,
    pub completed: usize,
    pub reused: usize,
    pub skipped: usize,
    pub failed: usize,
    pub inference_failures: usize,
    pub upload_failures: usize,
    pub analysis_failures: usize,
    pub inference_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &RunEvent) {
        match event {
            RunEvent::DescriptorStarted { .. } => {
                self.descriptors_started += 1;
            }
            RunEvent::StepFinished {
                step,
                success,
                duration_ms,
            } => {
                if *step == StepKind::Inference {
                    self.inference_durations_ms.push(*duration_ms);
                }
                if !success {
                    match step {
                        StepKind::Inference => self.inference_failures += 1,
                        StepKind::Upload => self.upload_failures += 1,
                        StepKind::Analysis => self.analysis_failures += 1,
                    }
                }
            }
            RunEvent::DescriptorFinished {
                outcome,
                reused_artifact,
            } => {
                self.descriptors_finished += 1;
                match outcome {
                    RunOutcome::Completed => {
                        self.completed += 1;
                        if *reused_artifact {
                            self.reused += 1;
                        }
                    }
                    RunOutcome::Skipped => self.skipped += 1,
                    RunOutcome::Failed => self.failed += 1,
                }
            }
        }
    }

    /// Calculate percentile from inference durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.inference_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.inference_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize - 1;
        let index = index.min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }

    /// One-line rendering for the final progress message
    pub fn summary_line(&self) -> String {
        format!(
            "{} completed ({} reused), {} skipped, {} failed",
            self.completed, self.reused, self.skipped, self.failed
        )
    }

    /// Total collaborator failures across all steps
    pub fn step_failures(&self) -> usize {
        self.inference_failures + self.upload_failures + self.analysis_failures
    }
}

/// Spawn the progress display task consuming the telemetry channel
///
/// Returns the task handle so the caller can wait for the final bar redraw
/// before printing its own summary.
pub fn spawn_progress_task(
    total_variants: u64,
    mut rx: mpsc::UnboundedReceiver<RunEvent>,
) -> tokio::task::JoinHandle<()> {
    let multi_progress = MultiProgress::new();

    let variants_bar = multi_progress.add(ProgressBar::new(total_variants));
    variants_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] Variants:  [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let timing_bar = multi_progress.add(ProgressBar::new(0));
    timing_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] Inference: {msg}")
            .unwrap(),
    );

    tokio::spawn(async move {
        let mut stats = ProgressStats::new();

        while let Some(event) = rx.recv().await {
            if let RunEvent::DescriptorStarted { variant } = &event {
                variants_bar.set_message(format!(
                    "running {} ({} of {})",
                    variant,
                    stats.descriptors_started + 1,
                    total_variants
                ));
            }
            stats.update(&event);

            variants_bar.set_position(stats.descriptors_finished as u64);

            if let (Some(p50), Some(p90), Some(p99)) = stats.get_percentiles() {
                timing_bar.set_message(format!(
                    "p50: {:.0}s, p90: {:.0}s, p99: {:.0}s",
                    p50 as f64 / 1000.0,
                    p90 as f64 / 1000.0,
                    p99 as f64 / 1000.0
                ));
            }
        }

        variants_bar.finish_with_message(stats.summary_line());
        if stats.step_failures() > 0 {
            timing_bar.finish_with_message(format!(
                "{} collaborator failure(s): {} inference, {} upload, {} speed-analysis",
                stats.step_failures(),
                stats.inference_failures,
                stats.upload_failures,
                stats.analysis_failures
            ));
        } else {
            timing_bar.finish();
        }
    })
}
