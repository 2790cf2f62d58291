//! The Scheduler's two operations (spec §4.2): materialize a validated
//! pipeline into the shared store and enqueue it, and answer status
//! queries over runs already materialized.

use std::sync::Arc;

use chainr_pipeline::{topological_sort, Pipeline};
use chainr_store::{keys, Store};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::status::{JobStatus, RunStatus, StatusListItem};

pub struct Scheduler {
    store: Arc<dyn Store>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Materializes `pipeline` as a fresh run and enqueues it for a
    /// Worker to claim. Jobs are written strictly before the run becomes
    /// visible (§4.2 "Rationale — ordering"): if any job write fails, the
    /// run never appears in `runs` or `runs:work`.
    pub async fn schedule(&self, pipeline: Pipeline) -> Result<RunStatus, SchedulerError> {
        let run_uid = Uuid::new_v4().to_string();
        let order = topological_sort(&pipeline.jobs);

        for name in &order {
            let job = &pipeline.jobs[name];
            let job_key = keys::job(&run_uid, name);

            if !job.depends_on.is_empty() {
                let mut dep_keys = Vec::with_capacity(job.depends_on.len());
                for (index, dep) in job.depends_on.iter().enumerate() {
                    let dep_key = keys::job_dependency(&run_uid, name, index);
                    let dep_job_key = keys::job(&run_uid, &dep.job);
                    self.store
                        .hset(
                            &dep_key,
                            &[
                                ("job", dep_job_key.as_str()),
                                ("failure", if dep.conditions.failure { "true" } else { "false" }),
                            ],
                        )
                        .await?;
                    dep_keys.push(dep_key);
                }
                let dep_key_refs: Vec<&str> = dep_keys.iter().map(String::as_str).collect();
                self.store
                    .sadd(&keys::job_dependencies(&run_uid, name), &dep_key_refs)
                    .await?;
            }

            self.store
                .hset(
                    &job_key,
                    &[
                        ("name", name.as_str()),
                        ("image", job.image.as_str()),
                        ("run", job.run.as_str()),
                        ("status", "PENDING"),
                    ],
                )
                .await?;
        }

        let job_keys: Vec<String> = order.iter().map(|name| keys::job(&run_uid, name)).collect();
        let job_key_refs: Vec<&str> = job_keys.iter().map(String::as_str).collect();
        self.store
            .rpush(&keys::run_jobs(&run_uid), &job_key_refs)
            .await?;

        let run_key = keys::run(&run_uid);
        self.store
            .hset(&run_key, &[("uid", run_uid.as_str()), ("status", "PENDING")])
            .await?;
        self.store.lpush(keys::runs_work(), &run_key).await?;
        self.store.lpush(keys::runs(), &run_key).await?;

        Ok(RunStatus {
            uid: run_uid,
            run: "PENDING".to_string(),
            jobs: order
                .into_iter()
                .map(|name| JobStatus {
                    name,
                    status: "PENDING".to_string(),
                })
                .collect(),
        })
    }

    /// Returns the current status of `run_uid`, or [`SchedulerError::NotFound`]
    /// if no such run was ever scheduled.
    pub async fn status(&self, run_uid: &str) -> Result<RunStatus, SchedulerError> {
        let run_key = keys::run(run_uid);
        let run = self.store.hgetall(&run_key).await?;
        if run.is_empty() {
            return Err(SchedulerError::NotFound);
        }
        let status = run.get("status").cloned().unwrap_or_default();

        let job_keys = self.store.lrange(&keys::run_jobs(run_uid), 0, -1).await?;
        let mut jobs = Vec::with_capacity(job_keys.len());
        for job_key in job_keys {
            let job = self.store.hgetall(&job_key).await?;
            jobs.push(JobStatus {
                name: job.get("name").cloned().unwrap_or_default(),
                status: job.get("status").cloned().unwrap_or_default(),
            });
        }

        Ok(RunStatus {
            uid: run_uid.to_string(),
            run: status,
            jobs,
        })
    }

    /// Lists every run ever scheduled, in submission order. The `runs`
    /// list is pushed to the head on each `Schedule` (§4.2), so the
    /// natural `LRange` read comes back newest-first; reversing it
    /// restores submission order, resolving the "must `StatusList` reflect
    /// submission order" open question named in §9.
    pub async fn status_list(&self) -> Result<Vec<StatusListItem>, SchedulerError> {
        let mut run_keys = self.store.lrange(keys::runs(), 0, -1).await?;
        run_keys.reverse();

        let mut items = Vec::with_capacity(run_keys.len());
        for run_key in run_keys {
            let run = self.store.hgetall(&run_key).await?;
            items.push(StatusListItem {
                uid: run.get("uid").cloned().unwrap_or_default(),
                status: run.get("status").cloned().unwrap_or_default(),
            });
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainr_pipeline::validate;
    use chainr_store::MemoryStore;

    fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn schedule_persists_jobs_before_the_run_and_returns_pending_status() {
        let scheduler = scheduler();
        let pipeline = validate(
            r#"{"kind":"Pipeline","jobs":{
                "a":{"image":"busybox","run":"exit 0"},
                "b":{"image":"busybox","run":"exit 0","dependsOn":[{"job":"a"}]}
            }}"#,
        )
        .unwrap();

        let status = scheduler.schedule(pipeline).await.unwrap();
        assert_eq!(status.run, "PENDING");
        assert_eq!(status.jobs.len(), 2);
        assert!(status.jobs.iter().all(|j| j.status == "PENDING"));
        let pos_a = status.jobs.iter().position(|j| j.name == "a").unwrap();
        let pos_b = status.jobs.iter().position(|j| j.name == "b").unwrap();
        assert!(pos_a < pos_b);
    }

    #[tokio::test]
    async fn status_round_trips_a_scheduled_run() {
        let scheduler = scheduler();
        let pipeline =
            validate(r#"{"kind":"Pipeline","jobs":{"a":{"image":"busybox","run":"exit 0"}}}"#)
                .unwrap();
        let scheduled = scheduler.schedule(pipeline).await.unwrap();

        // schedule() doesn't return the uid; recover it through status_list.
        let listed = scheduler.status_list().await.unwrap();
        assert_eq!(listed.len(), 1);

        let status = scheduler.status(&listed[0].uid).await.unwrap();
        assert_eq!(status.run, scheduled.run);
        assert_eq!(status.jobs, scheduled.jobs);
    }

    #[tokio::test]
    async fn status_on_unknown_uid_is_not_found() {
        let scheduler = scheduler();
        let err = scheduler.status("ghost").await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound));
    }

    #[tokio::test]
    async fn status_list_reflects_submission_order() {
        let scheduler = scheduler();
        for name in ["first", "second", "third"] {
            let pipeline = validate(&format!(
                r#"{{"kind":"Pipeline","jobs":{{"{name}":{{"image":"busybox","run":"exit 0"}}}}}}"#
            ))
            .unwrap();
            scheduler.schedule(pipeline).await.unwrap();
        }

        let listed = scheduler.status_list().await.unwrap();
        assert_eq!(listed.len(), 3);
        // Each run's single job is named after submission order; confirm
        // the first run listed is the first one submitted.
        let first_status = scheduler.status(&listed[0].uid).await.unwrap();
        assert_eq!(first_status.jobs[0].name, "first");
        let last_status = scheduler.status(&listed[2].uid).await.unwrap();
        assert_eq!(last_status.jobs[0].name, "third");
    }
}
