//! The dependency coordinator (spec §4.4): evaluates whether a job may
//! run given its dependencies' terminal outcomes, and the completion
//! signal each job publishes once it reaches one.
//!
//! Completion is a `tokio::sync::watch` channel seeded with `None`: every
//! reader `wait_for`s a `Some`, which is exactly the "condition variable
//! with a value" the spec names as one valid shape for the completion
//! latch. A job's status is written to the store and its event emitted
//! strictly before the channel is updated, so readers never observe a
//! completion signal ahead of the state it reports.

use tokio::sync::watch;

/// A job's terminal outcome, as read off its completion channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Successful,
    Failed,
    Skipped,
}

impl JobOutcome {
    pub fn as_status_str(self) -> &'static str {
        match self {
            JobOutcome::Successful => "SUCCESSFUL",
            JobOutcome::Failed => "FAILED",
            JobOutcome::Skipped => "SKIPPED",
        }
    }
}

/// One dependency's completion channel: `sender` is held by the job that
/// owns the outcome, `receiver` is cloned into every dependent that waits
/// on it.
pub fn completion_channel() -> (watch::Sender<Option<JobOutcome>>, watch::Receiver<Option<JobOutcome>>) {
    watch::channel(None)
}

/// Waits for `receiver` to report a terminal outcome and returns it.
pub async fn await_outcome(mut receiver: watch::Receiver<Option<JobOutcome>>) -> JobOutcome {
    receiver
        .wait_for(Option::is_some)
        .await
        .expect("sender dropped without ever completing")
        .expect("wait_for guarantees Some")
}

/// Whether a job depending on `dep_outcome` under `requires_failure` may
/// run (spec §4.4): `requires_failure=false` needs a SUCCESSFUL
/// dependency, `requires_failure=true` needs a FAILED one; a SKIPPED
/// dependency always propagates a skip regardless of the condition.
pub fn should_run(requires_failure: bool, dep_outcome: JobOutcome) -> bool {
    match dep_outcome {
        JobOutcome::Skipped => false,
        JobOutcome::Successful => !requires_failure,
        JobOutcome::Failed => requires_failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_required_is_satisfied_only_by_success() {
        assert!(should_run(false, JobOutcome::Successful));
        assert!(!should_run(false, JobOutcome::Failed));
        assert!(!should_run(false, JobOutcome::Skipped));
    }

    #[test]
    fn failure_required_is_satisfied_only_by_failure() {
        assert!(should_run(true, JobOutcome::Failed));
        assert!(!should_run(true, JobOutcome::Successful));
        assert!(!should_run(true, JobOutcome::Skipped));
    }

    #[tokio::test]
    async fn await_outcome_observes_the_value_written_before_send() {
        let (tx, rx) = completion_channel();
        tokio::spawn(async move {
            tx.send(Some(JobOutcome::Successful)).unwrap();
        });
        assert_eq!(await_outcome(rx).await, JobOutcome::Successful);
    }
}
