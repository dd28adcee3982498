//! The static variant table and run-plan construction
//!
//! Every descriptor in the plan is derived from this table plus a handful of
//! fixed benchmark parameters. The baseline variant is listed first so that a
//! fresh batch produces the baseline artifact before any comparison needs it.

use std::path::PathBuf;

use anyhow::{bail, Result};

use super::descriptor::{Invocation, RunDescriptor};
use crate::config::PYTHON_PROGRAM;

/// Base model every variant decodes with (and the tokenizer reference)
pub const BASE_MODEL: &str = "vicuna-7b-v1.3";

/// One row of the static variant table
struct VariantSpec {
    name: &'static str,
    /// Python module of this variant's inference runner
    module: &'static str,
    /// Extra checkpoint dependency: (runner flag, directory under models root)
    extra_model: Option<(&'static str, &'static str)>,
    baseline: bool,
}

const VARIANTS: &[VariantSpec] = &[
    VariantSpec {
        name: "vanilla",
        module: "evaluation.inference_baseline",
        extra_model: None,
        baseline: true,
    },
    VariantSpec {
        name: "sps",
        module: "evaluation.inference_sps",
        extra_model: Some(("--drafter-path", "vicuna-68m")),
        baseline: false,
    },
    VariantSpec {
        name: "medusa",
        module: "evaluation.inference_medusa",
        extra_model: Some(("--medusa-path", "medusa-vicuna-7b-v1.3")),
        baseline: false,
    },
    VariantSpec {
        name: "eagle",
        module: "evaluation.inference_eagle",
        extra_model: Some(("--ea-model-path", "EAGLE-Vicuna-7B-v1.3")),
        baseline: false,
    },
    VariantSpec {
        name: "pld",
        module: "evaluation.inference_pld",
        extra_model: None,
        baseline: false,
    },
    VariantSpec {
        name: "lookahead",
        module: "evaluation.inference_lookahead",
        extra_model: None,
        baseline: false,
    },
];

/// Fixed parameters shared by every descriptor in a plan
#[derive(Debug, Clone)]
pub struct PlanParams {
    pub models_dir: PathBuf,
    pub results_dir: PathBuf,
    pub bench_name: String,
    pub temperature: f64,
    pub dtype: String,
}

impl PlanParams {
    /// Path of the base model checkpoint, also used as the tokenizer reference
    pub fn base_model_path(&self) -> PathBuf {
        self.models_dir.join(BASE_MODEL)
    }
}

/// Names of all known variants, in plan order
pub fn variant_names() -> Vec<&'static str> {
    VARIANTS.iter().map(|v| v.name).collect()
}

/// Build the full default plan from the variant table
pub fn default_plan(params: &PlanParams) -> Vec<RunDescriptor> {
    VARIANTS.iter().map(|spec| build_descriptor(spec, params)).collect()
}

/// Restrict a plan to the named variants, preserving plan order
pub fn filter_plan(plan: Vec<RunDescriptor>, only: &[String]) -> Result<Vec<RunDescriptor>> {
    for name in only {
        if !VARIANTS.iter().any(|v| v.name == name.as_str()) {
            bail!(
                "Unknown variant '{}'. Known variants: {}",
                name,
                variant_names().join(", ")
            );
        }
    }
    Ok(plan
        .into_iter()
        .filter(|d| only.iter().any(|name| *name == d.variant))
        .collect())
}

fn build_descriptor(spec: &VariantSpec, params: &PlanParams) -> RunDescriptor {
    let model_id = model_id(spec.name, params);
    let artifact_path = params.results_dir.join(format!("{model_id}.jsonl"));
    let base_model = params.base_model_path();

    let mut model_paths = vec![base_model.clone()];
    let mut inference = Invocation::new(PYTHON_PROGRAM)
        .arg("-m")
        .arg(spec.module)
        .arg("--model-path")
        .arg_path(&base_model);

    if let Some((flag, dir)) = spec.extra_model {
        let extra_path = params.models_dir.join(dir);
        inference = inference.arg(flag).arg_path(&extra_path);
        model_paths.push(extra_path);
    }

    let inference = inference
        .arg("--model-id")
        .arg(model_id.clone())
        .arg("--bench-name")
        .arg(params.bench_name.clone())
        .arg("--temperature")
        .arg(format_temperature(params.temperature))
        .arg("--dtype")
        .arg(params.dtype.clone());

    RunDescriptor {
        variant: spec.name.to_string(),
        model_id,
        artifact_path,
        inference,
        model_paths,
        is_baseline: spec.baseline,
        speed_analysis: !spec.baseline,
    }
}

/// Derive the run identifier from the variant name and fixed parameters
///
/// The identifier doubles as the artifact file stem, so identical parameters
/// always map to the same artifact path.
fn model_id(variant: &str, params: &PlanParams) -> String {
    format!(
        "{}-{}-{}-temp-{}",
        BASE_MODEL,
        variant,
        params.dtype,
        format_temperature(params.temperature)
    )
}

/// Render a temperature with at least one decimal place ("0.0", not "0")
fn format_temperature(temperature: f64) -> String {
    if temperature.fract() == 0.0 {
        format!("{temperature:.1}")
    } else {
        format!("{temperature}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn test_params() -> PlanParams {
        PlanParams {
            models_dir: PathBuf::from("models"),
            results_dir: PathBuf::from("data/spec_bench/model_answer"),
            bench_name: "spec_bench".to_string(),
            temperature: 0.0,
            dtype: "float16".to_string(),
        }
    }

    #[test]
    fn test_baseline_is_first() {
        let plan = default_plan(&test_params());
        assert!(plan[0].is_baseline);
        assert_eq!(plan[0].variant, "vanilla");
        assert!(plan.iter().skip(1).all(|d| !d.is_baseline));
    }

    #[test]
    fn test_model_id_and_artifact_path_are_deterministic() {
        let plan = default_plan(&test_params());
        let vanilla = &plan[0];
        assert_eq!(vanilla.model_id, "vicuna-7b-v1.3-vanilla-float16-temp-0.0");
        assert_eq!(
            vanilla.artifact_path,
            Path::new("data/spec_bench/model_answer/vicuna-7b-v1.3-vanilla-float16-temp-0.0.jsonl")
        );
    }

    #[test]
    fn test_speed_analysis_applies_to_non_baseline_only() {
        let plan = default_plan(&test_params());
        for desc in &plan {
            assert_eq!(desc.speed_analysis, !desc.is_baseline);
        }
    }

    #[test]
    fn test_extra_model_dependency_in_paths_and_args() {
        let plan = default_plan(&test_params());
        let sps = plan.iter().find(|d| d.variant == "sps").unwrap();
        assert_eq!(sps.model_paths.len(), 2);
        assert_eq!(sps.model_paths[1], Path::new("models/vicuna-68m"));
        let args = &sps.inference.args;
        let flag_pos = args.iter().position(|a| a == "--drafter-path").unwrap();
        assert_eq!(args[flag_pos + 1], "models/vicuna-68m");
    }

    #[test]
    fn test_inference_args_carry_benchmark_parameters() {
        let plan = default_plan(&test_params());
        let pld = plan.iter().find(|d| d.variant == "pld").unwrap();
        let args = &pld.inference.args;
        assert_eq!(pld.inference.program, "python3");
        assert_eq!(args[0], "-m");
        assert_eq!(args[1], "evaluation.inference_pld");
        for expected in [
            "--model-path",
            "--model-id",
            "--bench-name",
            "--temperature",
            "--dtype",
        ] {
            assert!(args.iter().any(|a| a == expected), "missing {expected}");
        }
        let temp_pos = args.iter().position(|a| a == "--temperature").unwrap();
        assert_eq!(args[temp_pos + 1], "0.0");
    }

    #[test]
    fn test_filter_plan_keeps_order() {
        let plan = default_plan(&test_params());
        let only = vec!["eagle".to_string(), "vanilla".to_string()];
        let filtered = filter_plan(plan, &only).unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].variant, "vanilla");
        assert_eq!(filtered[1].variant, "eagle");
    }

    #[test]
    fn test_filter_plan_rejects_unknown_variant() {
        let plan = default_plan(&test_params());
        let err = filter_plan(plan, &["hydra".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Unknown variant 'hydra'"));
    }

    #[test]
    fn test_fractional_temperature_formatting() {
        let mut params = test_params();
        params.temperature = 0.7;
        let plan = default_plan(&params);
        assert_eq!(plan[0].model_id, "vicuna-7b-v1.3-vanilla-float16-temp-0.7");
    }
}
