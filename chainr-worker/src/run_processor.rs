//! The run-processing task (spec §4.3): validates a claimed run's
//! dependency graph, dispatches its jobs through the dependency
//! coordinator (§4.4), and aggregates the result into the run's final
//! status.

use std::collections::HashMap;
use std::sync::Arc;

use chainr_cloud::{CloudProvider, JobSubmission};
use chainr_events::Event;
use chainr_store::{keys, Store};
use tokio::sync::watch;
use tracing::{error, info};

use crate::dependency::{await_outcome, completion_channel, should_run, JobOutcome};
use crate::error::WorkerError;
use crate::events::emit;

pub struct RunProcessor {
    store: Arc<dyn Store>,
    cloud: Arc<dyn CloudProvider>,
}

/// One job as read back from the store, ready to dispatch.
struct JobSpec {
    key: String,
    name: String,
    image: String,
    run: String,
    /// (dependency job key, `failure` condition) pairs, read from the
    /// job's `dependencies:…` set.
    deps: Vec<(String, bool)>,
}

impl RunProcessor {
    pub fn new(store: Arc<dyn Store>, cloud: Arc<dyn CloudProvider>) -> Self {
        Self { store, cloud }
    }

    /// Drives one claimed run (`run_key`, e.g. `run:<uid>`) from whatever
    /// state it was left in through to a terminal run status. Safe to
    /// call more than once for the same run (§4.3 "Crash semantics"): a
    /// run recovered by the Recycler after a crash re-enters here and
    /// re-derives the same terminal outcome, assuming idempotent job
    /// effects.
    pub async fn process(&self, run_key: &str) {
        let Some(run_uid) = keys::parse_run_uid(run_key).map(str::to_string) else {
            error!(run_key, "malformed run key, skipping");
            return;
        };

        if let Err(err) = self.process_inner(&run_uid).await {
            error!(run = %run_uid, error = %err, "run terminated in failure");
        }
    }

    async fn process_inner(&self, run_uid: &str) -> Result<(), WorkerError> {
        let job_keys = match self.store.lrange(&keys::run_jobs(run_uid), 0, -1).await {
            Ok(job_keys) => job_keys,
            Err(err) => {
                self.fail_run(run_uid).await;
                return Err(err.into());
            }
        };

        if let Err(err) = self.check_dependency_tree(run_uid, &job_keys).await {
            self.fail_run(run_uid).await;
            return Err(err);
        }

        if let Err(err) = self.set_run_status(run_uid, "RUNNING").await {
            self.fail_run(run_uid).await;
            return Err(err);
        }
        emit(&self.store, Event::run_started(run_uid)).await;

        let jobs = match self.load_job_specs(run_uid, &job_keys).await {
            Ok(jobs) => jobs,
            Err(err) => {
                self.fail_run(run_uid).await;
                return Err(err);
            }
        };
        let outcomes = self.dispatch(jobs).await;

        let run_failed = outcomes.values().any(|o| *o == JobOutcome::Failed);
        let final_status = if run_failed { "FAILED" } else { "SUCCESSFUL" };
        self.set_run_status(run_uid, final_status).await?;
        if run_failed {
            emit(&self.store, Event::run_failed(run_uid)).await;
        } else {
            emit(&self.store, Event::run_succeeded(run_uid)).await;
        }

        info!(run = %run_uid, status = final_status, "run completed");
        Ok(())
    }

    async fn set_run_status(&self, run_uid: &str, status: &str) -> Result<(), WorkerError> {
        self.store
            .hset(&keys::run(run_uid), &[("status", status)])
            .await?;
        Ok(())
    }

    /// Marks the run FAILED and emits a FAILURE event, best-effort (spec
    /// §7: "any store failure during setup aborts the run with status
    /// FAILED"). Called from every setup-time abort path so the run never
    /// gets removed from its worker's processing queue (§4.3 step 8) while
    /// still sitting at a non-terminal status — a run left RUNNING/PENDING
    /// on a live worker would never be retried, since the Recycler only
    /// reclaims work from workers whose keepalive has already lapsed. If
    /// the status write itself fails too (the same outage that triggered
    /// this path), it is logged and swallowed rather than masking the
    /// original error.
    async fn fail_run(&self, run_uid: &str) {
        if let Err(err) = self.set_run_status(run_uid, "FAILED").await {
            error!(run = %run_uid, error = %err, "failed to persist FAILED status after a setup error");
        }
        emit(&self.store, Event::run_failed(run_uid)).await;
    }

    /// Walks every job's dependency set looking for a reference to a job
    /// not in this run, or a cycle (spec §4.3 item 2). A fresh on-path set
    /// is carried down each DFS so sibling branches don't spuriously
    /// collide, and is backtracked on the way out so the same job can
    /// legitimately appear in more than one dependency chain.
    async fn check_dependency_tree(
        &self,
        run_uid: &str,
        job_keys: &[String],
    ) -> Result<(), WorkerError> {
        let known: std::collections::HashSet<&str> =
            job_keys.iter().map(String::as_str).collect();

        for job_key in job_keys {
            let mut path = std::collections::HashSet::new();
            self.dfs(run_uid, job_key, &known, &mut path).await?;
        }
        Ok(())
    }

    fn dfs<'a>(
        &'a self,
        run_uid: &'a str,
        job_key: &'a str,
        known: &'a std::collections::HashSet<&'a str>,
        path: &'a mut std::collections::HashSet<String>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), WorkerError>> + Send + 'a>>
    {
        Box::pin(async move {
            if !path.insert(job_key.to_string()) {
                return Err(WorkerError::DependencyLoop(job_key.to_string()));
            }

            let Some(job_name) = keys::parse_job_name(run_uid, job_key) else {
                path.remove(job_key);
                return Ok(());
            };
            let dep_keys = self
                .store
                .smembers(&keys::job_dependencies(run_uid, job_name))
                .await?;

            for dep_key in dep_keys {
                let dep = self.store.hgetall(&dep_key).await?;
                let target = dep.get("job").cloned().unwrap_or_default();
                if !known.contains(target.as_str()) {
                    return Err(WorkerError::DanglingDependency(target));
                }
                self.dfs(run_uid, &target, known, path).await?;
            }

            path.remove(job_key);
            Ok(())
        })
    }

    async fn load_job_specs(
        &self,
        run_uid: &str,
        job_keys: &[String],
    ) -> Result<Vec<JobSpec>, WorkerError> {
        let mut specs = Vec::with_capacity(job_keys.len());
        for job_key in job_keys {
            let job = self.store.hgetall(job_key).await?;
            let name = job.get("name").cloned().unwrap_or_default();
            let image = job.get("image").cloned().unwrap_or_default();
            let run = job.get("run").cloned().unwrap_or_default();

            let dep_keys = self
                .store
                .smembers(&keys::job_dependencies(run_uid, &name))
                .await?;
            let mut deps = Vec::with_capacity(dep_keys.len());
            for dep_key in dep_keys {
                let dep = self.store.hgetall(&dep_key).await?;
                let dep_job_key = dep.get("job").cloned().unwrap_or_default();
                let failure = dep.get("failure").map(String::as_str) == Some("true");
                deps.push((dep_job_key, failure));
            }

            specs.push(JobSpec {
                key: job_key.clone(),
                name,
                image,
                run,
                deps,
            });
        }
        Ok(specs)
    }

    /// Spawns one task per job, each waiting on its dependencies'
    /// completion channels before running or skipping, and returns every
    /// job's final outcome keyed by job key.
    async fn dispatch(&self, jobs: Vec<JobSpec>) -> HashMap<String, JobOutcome> {
        let mut senders: HashMap<String, watch::Sender<Option<JobOutcome>>> = HashMap::new();
        let mut receivers: HashMap<String, watch::Receiver<Option<JobOutcome>>> = HashMap::new();
        for job in &jobs {
            let (tx, rx) = completion_channel();
            senders.insert(job.key.clone(), tx);
            receivers.insert(job.key.clone(), rx);
        }

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let tx = senders.remove(&job.key).expect("sender created above");
            let dep_rxs: Vec<(watch::Receiver<Option<JobOutcome>>, bool)> = job
                .deps
                .iter()
                .map(|(dep_key, requires_failure)| {
                    let rx = receivers
                        .get(dep_key)
                        .unwrap_or_else(|| panic!("dependency {dep_key} missing a channel"))
                        .clone();
                    (rx, *requires_failure)
                })
                .collect();

            let store = self.store.clone();
            let cloud = self.cloud.clone();

            handles.push(tokio::spawn(async move {
                let outcome = run_job_task(&store, &cloud, &job, dep_rxs, tx).await;
                (job.key, outcome)
            }));
        }

        let mut outcomes = HashMap::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok((key, outcome)) => {
                    outcomes.insert(key, outcome);
                }
                Err(err) => error!(error = %err, "job task panicked"),
            }
        }
        outcomes
    }
}

/// One job's lifecycle: wait on every dependency, decide whether to run
/// or skip, dispatch to the cloud provider if running, persist the
/// terminal status, and signal completion.
async fn run_job_task(
    store: &Arc<dyn Store>,
    cloud: &Arc<dyn CloudProvider>,
    job: &JobSpec,
    deps: Vec<(watch::Receiver<Option<JobOutcome>>, bool)>,
    tx: watch::Sender<Option<JobOutcome>>,
) -> JobOutcome {
    let mut dep_outcomes = Vec::with_capacity(deps.len());
    for (rx, requires_failure) in deps {
        let outcome = await_outcome(rx).await;
        dep_outcomes.push((requires_failure, outcome));
    }

    let may_run = dep_outcomes
        .iter()
        .all(|(requires_failure, outcome)| should_run(*requires_failure, *outcome));

    if !may_run {
        if let Err(err) = store
            .hset(&job.key, &[("status", "SKIPPED")])
            .await
        {
            error!(job = %job.key, error = %err, "failed to persist SKIPPED status");
        }
        let _ = tx.send(Some(JobOutcome::Skipped));
        return JobOutcome::Skipped;
    }

    if let Err(err) = store.hset(&job.key, &[("status", "RUNNING")]).await {
        error!(job = %job.key, error = %err, "failed to persist RUNNING status");
    }
    emit(store, Event::job_started(&job.key)).await;

    let result = cloud
        .run_job(JobSubmission {
            name: job.name.clone(),
            image: job.image.clone(),
            run: job.run.clone(),
        })
        .await;

    let outcome = if result.is_ok() {
        JobOutcome::Successful
    } else {
        JobOutcome::Failed
    };

    if let Err(err) = store
        .hset(&job.key, &[("status", outcome.as_status_str())])
        .await
    {
        error!(job = %job.key, error = %err, "failed to persist terminal status");
    }
    match outcome {
        JobOutcome::Successful => emit(store, Event::job_succeeded(&job.key)).await,
        JobOutcome::Failed => emit(store, Event::job_failed(&job.key)).await,
        JobOutcome::Skipped => unreachable!("skip path returns earlier"),
    }

    let _ = tx.send(Some(outcome));
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainr_cloud::MockProvider;
    use chainr_pipeline::{topological_sort, validate};
    use chainr_store::MemoryStore;

    async fn schedule(store: &Arc<dyn Store>, run_uid: &str, body: &str) {
        let pipeline = validate(body).unwrap();
        let order = topological_sort(&pipeline.jobs);
        for name in &order {
            let job = &pipeline.jobs[name];
            let job_key = keys::job(run_uid, name);
            if !job.depends_on.is_empty() {
                let mut dep_keys = Vec::new();
                for (i, dep) in job.depends_on.iter().enumerate() {
                    let dep_key = keys::job_dependency(run_uid, name, i);
                    store
                        .hset(
                            &dep_key,
                            &[
                                ("job", keys::job(run_uid, &dep.job).as_str()),
                                ("failure", if dep.conditions.failure { "true" } else { "false" }),
                            ],
                        )
                        .await
                        .unwrap();
                    dep_keys.push(dep_key);
                }
                let refs: Vec<&str> = dep_keys.iter().map(String::as_str).collect();
                store
                    .sadd(&keys::job_dependencies(run_uid, name), &refs)
                    .await
                    .unwrap();
            }
            store
                .hset(
                    &job_key,
                    &[
                        ("name", name.as_str()),
                        ("image", job.image.as_str()),
                        ("run", job.run.as_str()),
                        ("status", "PENDING"),
                    ],
                )
                .await
                .unwrap();
        }
        let job_keys: Vec<String> = order.iter().map(|n| keys::job(run_uid, n)).collect();
        let refs: Vec<&str> = job_keys.iter().map(String::as_str).collect();
        store.rpush(&keys::run_jobs(run_uid), &refs).await.unwrap();
        store
            .hset(&keys::run(run_uid), &[("uid", run_uid), ("status", "PENDING")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn linear_success_runs_both_jobs_in_order() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        schedule(
            &store,
            "u1",
            r#"{"kind":"Pipeline","jobs":{
                "a":{"image":"busybox","run":"exit 0"},
                "b":{"image":"busybox","run":"exit 0","dependsOn":[{"job":"a"}]}
            }}"#,
        )
        .await;

        let processor = RunProcessor::new(store.clone(), Arc::new(MockProvider::new()));
        processor.process("run:u1").await;

        let run = store.hgetall("run:u1").await.unwrap();
        assert_eq!(run.get("status"), Some(&"SUCCESSFUL".to_string()));
        let a = store.hgetall("job:a:run:u1").await.unwrap();
        assert_eq!(a.get("status"), Some(&"SUCCESSFUL".to_string()));
        let b = store.hgetall("job:b:run:u1").await.unwrap();
        assert_eq!(b.get("status"), Some(&"SUCCESSFUL".to_string()));
    }

    #[tokio::test]
    async fn expected_failure_gate_does_not_fail_the_dependent() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        schedule(
            &store,
            "u2",
            r#"{"kind":"Pipeline","jobs":{
                "a":{"image":"busybox","run":"exit 1"},
                "b":{"image":"busybox","run":"exit 0","dependsOn":[{"job":"a","conditions":{"failure":true}}]}
            }}"#,
        )
        .await;

        let processor = RunProcessor::new(
            store.clone(),
            Arc::new(MockProvider::failing(vec!["a".to_string()])),
        );
        processor.process("run:u2").await;

        let run = store.hgetall("run:u2").await.unwrap();
        assert_eq!(run.get("status"), Some(&"FAILED".to_string()));
        let a = store.hgetall("job:a:run:u2").await.unwrap();
        assert_eq!(a.get("status"), Some(&"FAILED".to_string()));
        let b = store.hgetall("job:b:run:u2").await.unwrap();
        assert_eq!(b.get("status"), Some(&"SUCCESSFUL".to_string()));
    }

    #[tokio::test]
    async fn skip_propagates_and_run_succeeds() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        schedule(
            &store,
            "u3",
            r#"{"kind":"Pipeline","jobs":{
                "a":{"image":"busybox","run":"exit 0"},
                "b":{"image":"busybox","run":"exit 0","dependsOn":[{"job":"a","conditions":{"failure":true}}]},
                "c":{"image":"busybox","run":"exit 0","dependsOn":[{"job":"b"}]}
            }}"#,
        )
        .await;

        let processor = RunProcessor::new(store.clone(), Arc::new(MockProvider::new()));
        processor.process("run:u3").await;

        let run = store.hgetall("run:u3").await.unwrap();
        assert_eq!(run.get("status"), Some(&"SUCCESSFUL".to_string()));
        let b = store.hgetall("job:b:run:u3").await.unwrap();
        assert_eq!(b.get("status"), Some(&"SKIPPED".to_string()));
        let c = store.hgetall("job:c:run:u3").await.unwrap();
        assert_eq!(c.get("status"), Some(&"SKIPPED".to_string()));
    }

    #[tokio::test]
    async fn cyclic_dependency_fails_the_run_without_running_jobs() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        schedule(
            &store,
            "u4",
            r#"{"kind":"Pipeline","jobs":{
                "a":{"image":"busybox","run":"exit 0","dependsOn":[{"job":"b"}]},
                "b":{"image":"busybox","run":"exit 0","dependsOn":[{"job":"a"}]}
            }}"#,
        )
        .await;

        let processor = RunProcessor::new(store.clone(), Arc::new(MockProvider::new()));
        processor.process("run:u4").await;

        let run = store.hgetall("run:u4").await.unwrap();
        assert_eq!(run.get("status"), Some(&"FAILED".to_string()));
        let a = store.hgetall("job:a:run:u4").await.unwrap();
        assert_eq!(a.get("status"), Some(&"PENDING".to_string()));
    }

    #[tokio::test]
    async fn dangling_dependency_fails_the_run() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        schedule(
            &store,
            "u5",
            r#"{"kind":"Pipeline","jobs":{
                "a":{"image":"busybox","run":"exit 0","dependsOn":[{"job":"ghost"}]}
            }}"#,
        )
        .await;

        let processor = RunProcessor::new(store.clone(), Arc::new(MockProvider::new()));
        processor.process("run:u5").await;

        let run = store.hgetall("run:u5").await.unwrap();
        assert_eq!(run.get("status"), Some(&"FAILED".to_string()));
    }

    /// Wraps a [`MemoryStore`] and fails `lrange` for one key, simulating a
    /// transient store blip during setup.
    struct FlakyStore {
        inner: MemoryStore,
        fail_lrange_for: String,
    }

    #[async_trait::async_trait]
    impl Store for FlakyStore {
        async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), chainr_store::StoreError> {
            self.inner.hset(key, fields).await
        }
        async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, chainr_store::StoreError> {
            self.inner.hget(key, field).await
        }
        async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, chainr_store::StoreError> {
            self.inner.hgetall(key).await
        }
        async fn sadd(&self, key: &str, members: &[&str]) -> Result<(), chainr_store::StoreError> {
            self.inner.sadd(key, members).await
        }
        async fn srem(&self, key: &str, member: &str) -> Result<(), chainr_store::StoreError> {
            self.inner.srem(key, member).await
        }
        async fn smembers(&self, key: &str) -> Result<Vec<String>, chainr_store::StoreError> {
            self.inner.smembers(key).await
        }
        async fn lpush(&self, key: &str, value: &str) -> Result<(), chainr_store::StoreError> {
            self.inner.lpush(key, value).await
        }
        async fn rpush(&self, key: &str, values: &[&str]) -> Result<(), chainr_store::StoreError> {
            self.inner.rpush(key, values).await
        }
        async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, chainr_store::StoreError> {
            if key == self.fail_lrange_for {
                return Err(chainr_store::StoreError::Connection("simulated outage".to_string()));
            }
            self.inner.lrange(key, start, stop).await
        }
        async fn lrem(&self, key: &str, count: isize, value: &str) -> Result<(), chainr_store::StoreError> {
            self.inner.lrem(key, count, value).await
        }
        async fn del(&self, key: &str) -> Result<(), chainr_store::StoreError> {
            self.inner.del(key).await
        }
        async fn brpoplpush(&self, src: &str, dst: &str) -> Result<String, chainr_store::StoreError> {
            self.inner.brpoplpush(src, dst).await
        }
    }

    #[tokio::test]
    async fn setup_store_failure_marks_the_run_failed_instead_of_dropping_it() {
        let flaky: Arc<dyn Store> = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            fail_lrange_for: keys::run_jobs("u6"),
        });
        schedule(
            &flaky,
            "u6",
            r#"{"kind":"Pipeline","jobs":{"a":{"image":"busybox","run":"exit 0"}}}"#,
        )
        .await;

        let processor = RunProcessor::new(flaky.clone(), Arc::new(MockProvider::new()));
        processor.process("run:u6").await;

        let run = flaky.hgetall("run:u6").await.unwrap();
        assert_eq!(run.get("status"), Some(&"FAILED".to_string()));
    }
}
