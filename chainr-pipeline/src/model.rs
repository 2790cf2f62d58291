//! The `Pipeline` shape submitters POST to the scheduler: a named set of
//! containerized jobs, each optionally gated on the outcome of others.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A validated pipeline submission. Construct one through
/// [`crate::validate::validate`] rather than deserializing directly — that
/// is where `kind`, required fields, and `additionalProperties=false` are
/// enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub kind: String,
    pub jobs: HashMap<String, Job>,
}

/// One containerized command within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub image: String,
    pub run: String,
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<JobDependency>,
}

/// A reference to another job in the same pipeline, plus the condition its
/// outcome must satisfy for this job to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDependency {
    pub job: String,
    #[serde(default)]
    pub conditions: DependencyConditions,
}

/// `failure=true` means "required to have failed"; `failure=false` (the
/// default) means "required to have succeeded".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConditions {
    #[serde(default)]
    pub failure: bool,
}

impl Default for DependencyConditions {
    fn default() -> Self {
        Self { failure: false }
    }
}
