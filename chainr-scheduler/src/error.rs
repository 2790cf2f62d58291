use thiserror::Error;

use chainr_pipeline::ValidationError;
use chainr_store::StoreError;

/// Errors the scheduler's operations can fail with (spec §7): a bad
/// submission, an unknown run uid, or a store that could not be reached.
/// The HTTP layer maps each variant to the status code named in §7.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("run not found")]
    NotFound,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ValidationError> for SchedulerError {
    fn from(err: ValidationError) -> Self {
        let ValidationError::BadRequest(msg) = err;
        SchedulerError::BadRequest(msg)
    }
}
