//! The pipeline document model, its schema validation, and the job
//! topological sort the scheduler runs before persisting a run.

pub mod model;
pub mod sort;
pub mod validate;

pub use model::{DependencyConditions, Job, JobDependency, Pipeline};
pub use sort::topological_sort;
pub use validate::{validate, ValidationError};
