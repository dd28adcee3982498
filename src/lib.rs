// Public API - the runner module plus the constants the CLI needs
pub mod config;
pub mod runner;

// Internal modules - organized by subsystem
mod coordination;
mod exec;
mod plan;
mod telemetry;
