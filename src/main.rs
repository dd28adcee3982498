use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;

use spec_bench_runner::config::{
    DEFAULT_BENCH_NAME, DEFAULT_CONFIG_FILE, DEFAULT_DTYPE, DEFAULT_LOG_DIR, DEFAULT_RESULTS_DIR,
    DEFAULT_TEMPERATURE, INTERRUPT_EXIT_CODE, MODELS_DIR_ENV,
};
use spec_bench_runner::runner::{self, BenchArgs, RunDescriptor};

#[derive(Parser, Clone)]
#[command(name = "spec-bench-runner", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Run the benchmark batch: for each variant, reuse or produce the result
    /// artifact, then upload it and compare its speed against the baseline
    Run {
        /// Configuration file for the upload/analysis collaborators
        /// (upload and analysis are skipped if it is absent)
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Root directory holding model checkpoints
        /// (defaults to $SPEC_BENCH_MODELS_DIR, then "models")
        #[arg(short, long)]
        models_dir: Option<PathBuf>,

        /// Directory where result artifacts are written
        #[arg(short, long, default_value = DEFAULT_RESULTS_DIR)]
        results_dir: PathBuf,

        /// Benchmark suite name passed to the inference runners
        #[arg(short, long, default_value = DEFAULT_BENCH_NAME)]
        bench_name: String,

        /// Comma-separated subset of variants to run (e.g. "vanilla,sps")
        #[arg(short, long)]
        only: Option<String>,

        /// GPU selection for inference children (sets CUDA_VISIBLE_DEVICES)
        #[arg(short, long)]
        devices: Option<String>,

        /// Print the plan without invoking any collaborator
        #[arg(long)]
        dry_run: bool,

        /// Quiet mode - minimal output, no progress bars
        #[arg(short, long)]
        quiet: bool,

        /// Directory for per-invocation log files
        #[arg(long, default_value = DEFAULT_LOG_DIR)]
        log_dir: PathBuf,
    },
    /// Check local prerequisites (config file, model paths, collaborator
    /// scripts) without invoking anything
    Check {
        /// Configuration file for the upload/analysis collaborators
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Root directory holding model checkpoints
        /// (defaults to $SPEC_BENCH_MODELS_DIR, then "models")
        #[arg(short, long)]
        models_dir: Option<PathBuf>,

        /// Directory where result artifacts are written
        #[arg(short, long, default_value = DEFAULT_RESULTS_DIR)]
        results_dir: PathBuf,
    },
    /// Upload a single result artifact to the artifact store
    Upload {
        /// Result artifact to upload
        #[arg(short, long)]
        artifact: PathBuf,

        /// Run identifier recorded with the upload
        #[arg(short, long)]
        model_id: String,

        /// Configuration file for the upload collaborator
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            config,
            models_dir,
            results_dir,
            bench_name,
            only,
            devices,
            dry_run,
            quiet,
            log_dir,
        } => {
            run_command(
                config, models_dir, results_dir, bench_name, only, devices, dry_run, quiet,
                log_dir,
            )
            .await?;
        }
        Command::Check {
            config,
            models_dir,
            results_dir,
        } => {
            check_command(config, models_dir, results_dir)?;
        }
        Command::Upload {
            artifact,
            model_id,
            config,
        } => {
            upload_command(config, artifact, model_id).await?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_command(
    config: PathBuf,
    models_dir: Option<PathBuf>,
    results_dir: PathBuf,
    bench_name: String,
    only: Option<String>,
    devices: Option<String>,
    dry_run: bool,
    quiet: bool,
    log_dir: PathBuf,
) -> anyhow::Result<()> {
    let models_dir = cli::resolve_models_dir(models_dir, std::env::var(MODELS_DIR_ENV).ok());

    let bench_args = BenchArgs {
        config_file: config.clone(),
        models_dir: models_dir.clone(),
        results_dir: results_dir.clone(),
        bench_name,
        temperature: DEFAULT_TEMPERATURE,
        dtype: DEFAULT_DTYPE.to_string(),
        only: only.as_deref().map(cli::parse_variant_list),
        devices,
        quiet,
    };

    // Handle dry-run mode before touching the log directory
    if dry_run {
        let plan = runner::build_plan(&bench_args)?;
        print_plan(&plan);
        return Ok(());
    }

    let log_path = init_logging(&log_dir, quiet)?;

    if !quiet {
        println!("Spec-Bench Run Coordinator");
        println!("==========================");
        println!("Config: {}", config.display());
        println!("Models: {}", models_dir.display());
        println!("Results: {}", results_dir.display());
        println!();
    }

    tokio::select! {
        result = runner::run_bench(bench_args) => {
            let outcome = result?;

            println!();
            println!("Benchmark Summary");
            println!("=================");
            println!("Run ID: {}", outcome.run_id);
            println!("Variants: {}", outcome.variants_total);
            println!("Completed: {} ({} reused)", outcome.completed, outcome.reused);
            println!("Skipped: {}", outcome.skipped);
            println!("Failed: {}", outcome.failed);
            println!("Duration: {:.2}s", outcome.duration.as_secs_f64());
            println!("Report: {}", outcome.report_path.display());
            println!("Log: {}", log_path.display());
        }
        _ = shutdown_signal() => {
            warn!("Interrupted, exiting without cleanup of partial artifacts");
            std::process::exit(INTERRUPT_EXIT_CODE);
        }
    }

    Ok(())
}

fn check_command(
    config: PathBuf,
    models_dir: Option<PathBuf>,
    results_dir: PathBuf,
) -> anyhow::Result<()> {
    let models_dir = cli::resolve_models_dir(models_dir, std::env::var(MODELS_DIR_ENV).ok());

    let bench_args = BenchArgs {
        config_file: config,
        models_dir,
        results_dir,
        bench_name: DEFAULT_BENCH_NAME.to_string(),
        temperature: DEFAULT_TEMPERATURE,
        dtype: DEFAULT_DTYPE.to_string(),
        only: None,
        devices: None,
        quiet: true,
    };

    let report = runner::preflight(&bench_args)?;

    println!("Preflight Check");
    println!("===============");
    println!(
        "Config file {}: {}",
        report.config_file.display(),
        if report.config_file_present {
            "present"
        } else {
            "MISSING (upload/analysis will be skipped)"
        }
    );
    for (script, present) in &report.collaborators {
        println!(
            "Collaborator {}: {}",
            script,
            if *present { "present" } else { "MISSING" }
        );
    }
    println!();
    for variant in &report.variants {
        if variant.runnable() {
            println!(
                "Variant {}: ok{}",
                variant.variant,
                if variant.artifact_exists {
                    " (artifact exists, would reuse)"
                } else {
                    ""
                }
            );
        } else {
            println!("Variant {}: NOT RUNNABLE", variant.variant);
            for (path, problem) in &variant.path_problems {
                println!("  {} {}", path.display(), problem);
            }
        }
    }

    if !report.baseline_ok() {
        eprintln!();
        eprintln!("The baseline variant cannot run; fix its model paths first.");
        std::process::exit(1);
    }

    Ok(())
}

async fn upload_command(
    config: PathBuf,
    artifact: PathBuf,
    model_id: String,
) -> anyhow::Result<()> {
    let outcome = runner::upload_artifact(&config, &artifact, &model_id).await?;

    if outcome.success() {
        println!(
            "Uploaded {} in {:.1}s",
            artifact.display(),
            outcome.duration.as_secs_f64()
        );
        Ok(())
    } else {
        match outcome.exit_code {
            Some(code) => eprintln!("Upload failed with exit code {code}"),
            None => eprintln!("Upload terminated by signal"),
        }
        std::process::exit(1);
    }
}

/// Print the run plan for `--dry-run`
fn print_plan(plan: &[RunDescriptor]) {
    println!("DRY RUN MODE - No collaborators will be invoked");
    println!();
    for descriptor in plan {
        println!("Variant: {}", descriptor.variant);
        println!("  Model id: {}", descriptor.model_id);
        println!(
            "  Artifact: {}{}",
            descriptor.artifact_path.display(),
            if descriptor.artifact_path.exists() {
                " (exists, inference would be skipped)"
            } else {
                ""
            }
        );
        println!("  Command:  {}", descriptor.inference.display_line());
        println!();
    }
    println!("To execute, run without --dry-run");
}

/// Initialize tracing with a stdout layer and a per-invocation log file
fn init_logging(log_dir: &Path, quiet: bool) -> anyhow::Result<PathBuf> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    std::fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    let log_path = log_dir.join(cli::log_file_name(chrono::Utc::now()));
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let default_filter = if quiet {
        "spec_bench_runner=warn"
    } else {
        "spec_bench_runner=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Arc::new(log_file)),
        )
        .init();

    Ok(log_path)
}

/// Resolve once either interrupt (Ctrl-C) or termination is requested
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// CLI utility functions for argument resolution
mod cli {
    use std::path::PathBuf;

    use spec_bench_runner::config::DEFAULT_MODELS_DIR;

    /// Resolve the models root: explicit flag, then environment, then default
    pub fn resolve_models_dir(flag: Option<PathBuf>, env: Option<String>) -> PathBuf {
        if let Some(dir) = flag {
            return dir;
        }
        if let Some(dir) = env {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        PathBuf::from(DEFAULT_MODELS_DIR)
    }

    /// Parse a comma-separated variant list, dropping empty entries
    pub fn parse_variant_list(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Log file name for one invocation, e.g. "spec_bench_run_20250101_120000.log"
    pub fn log_file_name(now: chrono::DateTime<chrono::Utc>) -> String {
        format!("spec_bench_run_{}.log", now.format("%Y%m%d_%H%M%S"))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::TimeZone;

        #[test]
        fn test_resolve_models_dir_prefers_flag() {
            let dir = resolve_models_dir(
                Some(PathBuf::from("/opt/models")),
                Some("/env/models".to_string()),
            );
            assert_eq!(dir, PathBuf::from("/opt/models"));
        }

        #[test]
        fn test_resolve_models_dir_falls_back_to_env() {
            let dir = resolve_models_dir(None, Some("/env/models".to_string()));
            assert_eq!(dir, PathBuf::from("/env/models"));
        }

        #[test]
        fn test_resolve_models_dir_ignores_blank_env() {
            let dir = resolve_models_dir(None, Some("  ".to_string()));
            assert_eq!(dir, PathBuf::from(DEFAULT_MODELS_DIR));
        }

        #[test]
        fn test_parse_variant_list() {
            assert_eq!(
                parse_variant_list("vanilla, sps,,eagle"),
                vec!["vanilla", "sps", "eagle"]
            );
            assert!(parse_variant_list("").is_empty());
        }

        #[test]
        fn test_log_file_name() {
            let now = chrono::Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
            assert_eq!(log_file_name(now), "spec_bench_run_20250102_030405.log");
        }
    }
}
