use thiserror::Error;

use chainr_store::StoreError;

/// Failures that can abort a single run-processing task (spec §4.3, §7).
/// Every variant here corresponds to a run terminating FAILED rather than
/// the worker process exiting — the claim loop and keepalive loop survive
/// any of these.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("job {0} was not found in the dependency tree")]
    DanglingDependency(String),

    #[error("dependency loop found in job {0}")]
    DependencyLoop(String),
}
