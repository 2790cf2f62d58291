//! The cloud adapter capability (spec §4.8): submit one containerized job
//! to a runtime and await its terminal state. `KubernetesProvider` is the
//! shipped implementation, submitting Kubernetes Batch `Job` objects;
//! `MockProvider` stands in for it in tests that don't want a cluster.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams, PropagationPolicy};
use kube::runtime::wait::await_condition;
use kube::{Client, Config};
use thiserror::Error;
use tracing::{info, warn};

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY_VALUE: &str = "chainr";
const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// One containerized command to submit, as the Worker hands it to the
/// adapter: its display name, the image to run, and the shell command.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub name: String,
    pub image: String,
    pub run: String,
}

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("could not connect to cluster: {0}")]
    Connection(String),
    #[error("job submission failed: {0}")]
    Submission(String),
    #[error("job terminated in a failed state")]
    Failed,
}

/// Submits a job to a container runtime and awaits its terminal state.
/// Inputs are a [`JobSubmission`]; a non-error return means the job ran to
/// completion successfully.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn run_job(&self, job: JobSubmission) -> Result<(), CloudError>;
}

/// Runs jobs as Kubernetes Batch `Job` objects. Connects in-cluster when
/// `KUBECONFIG` is unset, otherwise from the file it names (`kube::Config`
/// already resolves this the same way `kube::Client::try_default` does);
/// jobs are created in the service account's namespace, labeled for
/// cleanup, and deleted with foreground cascade once terminal.
pub struct KubernetesProvider {
    client: Client,
    namespace: String,
}

impl KubernetesProvider {
    pub async fn connect() -> Result<Self, CloudError> {
        let config = Config::infer()
            .await
            .map_err(|e| CloudError::Connection(e.to_string()))?;
        let client =
            Client::try_from(config).map_err(|e| CloudError::Connection(e.to_string()))?;
        let namespace = read_namespace();
        Ok(Self { client, namespace })
    }

    fn jobs_api(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

fn read_namespace() -> String {
    match std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE_FILE) {
        Ok(namespace) => namespace.trim().to_string(),
        Err(_) => {
            warn!("could not read service account namespace file, defaulting to \"default\"");
            "default".to_string()
        }
    }
}

fn job_manifest(job: &JobSubmission) -> Job {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

    Job {
        metadata: ObjectMeta {
            generate_name: Some("chainr-job-".to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "job".to_string(),
                        image: Some(job.image.clone()),
                        command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
                        args: Some(vec![job.run.clone()]),
                        ..Default::default()
                    }],
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl CloudProvider for KubernetesProvider {
    async fn run_job(&self, job: JobSubmission) -> Result<(), CloudError> {
        let jobs = self.jobs_api();
        let manifest = job_manifest(&job);

        let created = jobs
            .create(&PostParams::default(), &manifest)
            .await
            .map_err(|e| CloudError::Submission(e.to_string()))?;
        let name = created
            .metadata
            .name
            .clone()
            .ok_or_else(|| CloudError::Submission("created job has no name".to_string()))?;
        info!(job = %job.name, k8s_name = %name, "submitted job");

        // Blocks indefinitely until the job reaches a terminal state; the
        // operator intervenes (restarting the worker) if the runtime itself
        // hangs, and the recycler takes over from there.
        let result = await_condition(jobs.clone(), &name, |obj: Option<&Job>| {
            obj.and_then(|j| j.status.as_ref())
                .map(|status| status.succeeded.unwrap_or(0) > 0 || status.failed.unwrap_or(0) > 0)
                .unwrap_or(false)
        })
        .await
        .map_err(|e| CloudError::Submission(e.to_string()))?;

        let succeeded = result
            .and_then(|j| j.status)
            .map(|status| status.succeeded.unwrap_or(0) > 0)
            .unwrap_or(false);

        let delete_params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            ..Default::default()
        };
        if let Err(err) = jobs.delete(&name, &delete_params).await {
            warn!(k8s_name = %name, error = %err, "failed to delete completed job");
        }

        if succeeded {
            Ok(())
        } else {
            Err(CloudError::Failed)
        }
    }
}

/// A canned-outcome `CloudProvider` for tests: jobs whose name is in
/// `fail_names` report `CloudError::Failed`, everything else succeeds.
/// Every submission is recorded for assertions.
#[derive(Default)]
pub struct MockProvider {
    fail_names: Vec<String>,
    submitted: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(fail_names: Vec<String>) -> Self {
        Self {
            fail_names,
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    async fn run_job(&self, job: JobSubmission) -> Result<(), CloudError> {
        self.submitted.lock().unwrap().push(job.name.clone());
        if self.fail_names.contains(&job.name) {
            Err(CloudError::Failed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_records_submissions_and_honors_failures() {
        let provider = MockProvider::failing(vec!["b".to_string()]);

        let ok = provider
            .run_job(JobSubmission {
                name: "a".to_string(),
                image: "busybox".to_string(),
                run: "exit 0".to_string(),
            })
            .await;
        assert!(ok.is_ok());

        let err = provider
            .run_job(JobSubmission {
                name: "b".to_string(),
                image: "busybox".to_string(),
                run: "exit 1".to_string(),
            })
            .await;
        assert!(matches!(err, Err(CloudError::Failed)));

        assert_eq!(provider.submitted(), vec!["a", "b"]);
    }

    #[test]
    fn job_manifest_carries_the_managed_by_label_and_safe_defaults() {
        let manifest = job_manifest(&JobSubmission {
            name: "build".to_string(),
            image: "busybox".to_string(),
            run: "echo hi".to_string(),
        });
        let labels = manifest.metadata.labels.unwrap();
        assert_eq!(labels.get(MANAGED_BY_LABEL), Some(&MANAGED_BY_VALUE.to_string()));
        let spec = manifest.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(0));
        let pod_spec = spec.template.spec.unwrap();
        assert_eq!(pod_spec.restart_policy, Some("Never".to_string()));
    }
}
