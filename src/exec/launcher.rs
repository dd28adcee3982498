use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::plan::Invocation;

/// What happened to a launched collaborator process
///
/// Collaborators are judged solely by exit status and the files they leave
/// behind, so this is all the coordinator ever learns about one.
#[derive(Debug, Clone, Copy)]
pub struct LaunchOutcome {
    /// Process exit code; `None` if the process was ended by a signal
    pub exit_code: Option<i32>,
    /// Wall-clock time from spawn to exit
    pub duration: Duration,
}

impl LaunchOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for launching external collaborator processes
///
/// Abstracting the spawn lets tests substitute a scripted implementation and
/// assert on the exact invocations the coordinator makes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Run the invocation to completion and report its outcome
    ///
    /// Returns `Err` only when the process could not be spawned or waited on;
    /// a non-zero exit is an `Ok` outcome for the caller to interpret.
    async fn launch(&self, invocation: &Invocation) -> Result<LaunchOutcome>;
}

/// Launcher backed by `tokio::process`
///
/// Stdout and stderr are inherited so collaborator output interleaves with the
/// coordinator's own console output.
pub struct TokioProcessLauncher;

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn launch(&self, invocation: &Invocation) -> Result<LaunchOutcome> {
        let start = Instant::now();

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        for (key, value) in &invocation.envs {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", invocation.program))?;

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for '{}'", invocation.program))?;

        Ok(LaunchOutcome {
            exit_code: status.code(),
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_process() {
        let outcome = TokioProcessLauncher
            .launch(&Invocation::new("true"))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.success());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_ok_outcome() {
        let invocation = Invocation::new("sh").arg("-c").arg("exit 3");
        let outcome = TokioProcessLauncher.launch(&invocation).await.unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn test_env_is_passed_to_child() {
        let invocation = Invocation::new("sh")
            .arg("-c")
            .arg("test \"$MARKER\" = on")
            .env("MARKER", "on");
        let outcome = TokioProcessLauncher.launch(&invocation).await.unwrap();
        assert!(outcome.success());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let result = TokioProcessLauncher
            .launch(&Invocation::new("/nonexistent/collaborator"))
            .await;
        assert!(result.is_err());
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("Failed to spawn"), "unexpected error: {msg}");
    }
}
