use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Outcome of one collaborator step within a descriptor's pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// The collaborator ran and exited zero
    Success,
    /// The collaborator exited non-zero, or could not be spawned (`None`)
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
    /// The step was not attempted
    Skipped { reason: String },
}

impl StepStatus {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StepStatus::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepStatus::Failed { .. })
    }
}

/// How a descriptor's pipeline ended overall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// A result artifact exists (freshly produced or reused)
    Completed,
    /// Preconditions failed; nothing was invoked
    Skipped,
    /// Inference failed; no artifact was produced
    Failed,
}

/// Record of one descriptor's pipeline, written into the run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorReport {
    pub variant: String,
    pub model_id: String,
    pub artifact_path: String,
    pub outcome: RunOutcome,
    /// True when the result artifact predated this run
    pub reused_artifact: bool,
    pub inference: StepStatus,
    pub upload: StepStatus,
    pub analysis: StepStatus,
    pub started_at: String,   // ISO 8601
    pub completed_at: String, // ISO 8601
    pub duration_secs: u64,
}

/// The report file written once per coordinator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReportFile {
    pub run_id: String,
    pub bench_name: String,
    pub started_at: String,   // ISO 8601
    pub completed_at: String, // ISO 8601
    pub duration_secs: u64,
    pub descriptors: Vec<DescriptorReport>,
}

/// Trait for run-report persistence
///
/// Abstracted so tests can inspect reports without touching the real results
/// tree, and so a remote implementation could be swapped in later.
#[async_trait::async_trait]
pub trait ReportStorage: Send + Sync {
    /// Write the report for a run
    async fn write_report(&self, run_id: &str, report: &RunReportFile) -> Result<()>;

    /// Read the report for a run
    async fn read_report(&self, run_id: &str) -> Result<RunReportFile>;
}

/// Local filesystem implementation of ReportStorage
///
/// Directory structure:
///   {base_dir}/runs/{run_id}/report.json
pub struct LocalReportStorage {
    base_dir: PathBuf,
}

impl LocalReportStorage {
    /// Create a new LocalReportStorage rooted at the given directory
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn report_path(&self, run_id: &str) -> PathBuf {
        self.base_dir.join("runs").join(run_id).join("report.json")
    }
}

#[async_trait::async_trait]
impl ReportStorage for LocalReportStorage {
    async fn write_report(&self, run_id: &str, report: &RunReportFile) -> Result<()> {
        let report_path = self.report_path(run_id);

        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create report directory")?;
        }

        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;

        fs::write(&report_path, json)
            .await
            .context("Failed to write report file")?;

        Ok(())
    }

    async fn read_report(&self, run_id: &str) -> Result<RunReportFile> {
        let report_path = self.report_path(run_id);

        let contents = fs::read_to_string(&report_path)
            .await
            .context("Failed to read report file")?;

        let report: RunReportFile =
            serde_json::from_str(&contents).context("Failed to parse report file")?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report(run_id: &str) -> RunReportFile {
        RunReportFile {
            run_id: run_id.to_string(),
            bench_name: "spec_bench".to_string(),
            started_at: "2025-12-03T10:00:00Z".to_string(),
            completed_at: "2025-12-03T11:30:00Z".to_string(),
            duration_secs: 5400,
            descriptors: vec![DescriptorReport {
                variant: "sps".to_string(),
                model_id: "vicuna-7b-v1.3-sps-float16-temp-0.0".to_string(),
                artifact_path: "data/out/sps.jsonl".to_string(),
                outcome: RunOutcome::Completed,
                reused_artifact: false,
                inference: StepStatus::Success,
                upload: StepStatus::Failed { exit_code: Some(1) },
                analysis: StepStatus::skipped("baseline artifact not found"),
                started_at: "2025-12-03T10:00:00Z".to_string(),
                completed_at: "2025-12-03T10:45:00Z".to_string(),
                duration_secs: 2700,
            }],
        }
    }

    #[test]
    fn test_step_status_serialization() {
        let json = serde_json::to_value(&StepStatus::Success).unwrap();
        assert_eq!(json["status"], "success");

        let json = serde_json::to_value(&StepStatus::Failed { exit_code: Some(2) }).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["exit_code"], 2);

        // A spawn failure has no exit code at all
        let json = serde_json::to_value(&StepStatus::Failed { exit_code: None }).unwrap();
        assert!(json.get("exit_code").is_none());

        let json = serde_json::to_value(&StepStatus::skipped("configuration file not found"))
            .unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "configuration file not found");
    }

    #[test]
    fn test_step_status_round_trip() {
        let statuses = vec![
            StepStatus::Success,
            StepStatus::Failed { exit_code: Some(7) },
            StepStatus::Failed { exit_code: None },
            StepStatus::skipped("inference did not produce an artifact"),
        ];
        for status in statuses {
            let json = serde_json::to_string(&status).unwrap();
            let back: StepStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[tokio::test]
    async fn test_local_report_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalReportStorage::new(dir.path().to_path_buf());

        let report = sample_report("run-42");
        storage.write_report("run-42", &report).await.unwrap();

        let back = storage.read_report("run-42").await.unwrap();
        assert_eq!(back.run_id, "run-42");
        assert_eq!(back.descriptors.len(), 1);
        assert_eq!(back.descriptors[0].outcome, RunOutcome::Completed);
        assert_eq!(
            back.descriptors[0].upload,
            StepStatus::Failed { exit_code: Some(1) }
        );
    }

    #[tokio::test]
    async fn test_read_missing_report_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalReportStorage::new(dir.path().to_path_buf());
        assert!(storage.read_report("no-such-run").await.is_err());
    }
}
