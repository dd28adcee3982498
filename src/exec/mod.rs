//! Subprocess boundary for launching collaborator programs

pub mod launcher;

pub use launcher::{LaunchOutcome, ProcessLauncher, TokioProcessLauncher};
