//! Key-namespace builders for the shared KV/queue store (spec §3).
//!
//! Every key chainr writes or reads is built through one of these
//! functions so the namespace stays consistent across the four services,
//! the same way the original kept `make*Key` helpers next to the redis
//! client that used them.

pub fn run(run_uid: &str) -> String {
    format!("run:{run_uid}")
}

/// Recovers a run uid from its `run:<uid>` key, the inverse of [`run`].
pub fn parse_run_uid(run_key: &str) -> Option<&str> {
    run_key.strip_prefix("run:")
}

pub fn runs() -> &'static str {
    "runs"
}

pub fn runs_work() -> &'static str {
    "runs:work"
}

pub fn runs_worker(worker_name: &str) -> String {
    format!("runs:worker:{worker_name}")
}

pub fn run_jobs(run_uid: &str) -> String {
    format!("jobs:{}", run(run_uid))
}

pub fn job(run_uid: &str, job_name: &str) -> String {
    format!("job:{job_name}:{}", run(run_uid))
}

/// Recovers a job's bare name from one of its keys (the inverse of
/// [`job`]), used by the Worker when it only has the `job:<name>:run:<u>`
/// key string from a list or set and needs the name to look up the job's
/// own dependency set.
pub fn parse_job_name<'a>(run_uid: &str, job_key: &'a str) -> Option<&'a str> {
    job_key
        .strip_prefix("job:")?
        .strip_suffix(&format!(":run:{run_uid}"))
}

pub fn job_dependencies(run_uid: &str, job_name: &str) -> String {
    format!("dependencies:{}", job(run_uid, job_name))
}

pub fn job_dependency(run_uid: &str, job_name: &str, index: usize) -> String {
    format!("dependency:{index}:{}", job(run_uid, job_name))
}

pub fn workers() -> &'static str {
    "workers"
}

pub fn worker(worker_name: &str) -> String {
    format!("worker:{worker_name}")
}

pub fn events_notif() -> &'static str {
    "events:notif"
}

pub fn events_notifier(worker_name: &str) -> String {
    format!("events:notifier:{worker_name}")
}

pub fn event(uuid: &str) -> String {
    format!("event:{uuid}")
}
