//! Run-plan construction: variant table, descriptors, collaborator commands

pub mod descriptor;
pub mod variants;

pub use descriptor::{
    analyze_invocation, check_model_paths, upload_invocation, Invocation, PathProblem,
    RunDescriptor,
};
pub use variants::{default_plan, filter_plan, variant_names, PlanParams};
