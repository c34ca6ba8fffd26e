//! Push orchestration: create one job, upload every artifact in order,
//! execute once.
//!
//! Any failure aborts the remaining steps. A remote job that was already
//! created is left as the endpoint holds it; it is not deleted or rolled
//! back, and its id is reported in the returned `PushFailure`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::datapush::client::redact_id;
use crate::datapush::DataPushClient;
use crate::error::{JobPhase, PushError};
use crate::push::artifact::PushArtifact;
use crate::push::state::PushJob;

// ─────────────────────────────────────────────────────────────────────────────
// Traits for Testing
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for data-push client operations, allowing test fakes.
pub trait JobClientOps: Send + Sync {
    /// Creates a new job and returns its id.
    fn create_job<'a>(
        &'a self,
        target_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, PushError>> + Send + 'a>>;

    /// Uploads one artifact as a chunk of the job.
    fn upload_chunk<'a>(
        &'a self,
        job_id: &'a str,
        artifact: &'a PushArtifact,
    ) -> Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + 'a>>;

    /// Executes the job.
    fn execute_job<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + 'a>>;
}

/// Implementation of JobClientOps for the real DataPushClient.
impl JobClientOps for DataPushClient {
    fn create_job<'a>(
        &'a self,
        target_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, PushError>> + Send + 'a>> {
        Box::pin(DataPushClient::create_job(self, target_name))
    }

    fn upload_chunk<'a>(
        &'a self,
        job_id: &'a str,
        artifact: &'a PushArtifact,
    ) -> Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + 'a>> {
        Box::pin(DataPushClient::upload_chunk(self, job_id, artifact))
    }

    fn execute_job<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + 'a>> {
        Box::pin(DataPushClient::execute_job(self, job_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PushFailure
// ─────────────────────────────────────────────────────────────────────────────

/// A failed push: the error plus the job in its `Failed` state.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PushFailure {
    pub job: PushJob,
    #[source]
    pub error: PushError,
}

impl From<PushFailure> for PushError {
    fn from(failure: PushFailure) -> Self {
        failure.error
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PushOrchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one push job through create → upload chunk(s) → execute.
///
/// Holds no state shared with other submissions; each call to `run` owns
/// its own `PushJob`.
pub struct PushOrchestrator<C: JobClientOps> {
    client: C,
    pool_id: String,
    chunk_delay: Duration,
}

impl<C: JobClientOps> PushOrchestrator<C> {
    pub fn new(client: C, pool_id: impl Into<String>, chunk_delay: Duration) -> Self {
        Self {
            client,
            pool_id: pool_id.into(),
            chunk_delay,
        }
    }

    /// Pushes `artifacts` as the chunks of one new job named `target_name`.
    ///
    /// Artifacts are uploaded strictly in the order given; the configured
    /// delay is applied between two uploads but never after the last one.
    /// Execute is only attempted once every upload succeeded.
    ///
    /// # Returns
    ///
    /// The job in its `Executed` state.
    ///
    /// # Errors
    ///
    /// A `PushFailure` carrying the job (in `Failed` state, with its id when
    /// the remote job exists) and the error of the failing phase. An empty
    /// artifact list fails with `PushError::Configuration` before any call;
    /// indexes other than `0..n`, or a last flag anywhere but on the final
    /// artifact, fail with `PushError::Internal`.
    pub async fn run(
        &self,
        target_name: &str,
        artifacts: &[PushArtifact],
    ) -> Result<PushJob, PushFailure> {
        let mut job = PushJob::new(target_name, self.pool_id.as_str());

        if artifacts.is_empty() {
            return Err(PushFailure {
                job,
                error: PushError::Configuration("nothing to push: no artifacts".to_string()),
            });
        }
        let total = artifacts.len();
        if let Some(pos) = artifacts
            .iter()
            .enumerate()
            .position(|(i, a)| a.index != i || a.is_last != (i + 1 == total))
        {
            return Err(PushFailure {
                job,
                error: PushError::Internal(format!(
                    "artifact at position {} of {} has sequence index {} (last: {})",
                    pos, total, artifacts[pos].index, artifacts[pos].is_last
                )),
            });
        }

        // Step 1: Create the job
        let job_id = match self.client.create_job(target_name).await {
            Ok(id) => id,
            Err(e) => return Err(fail(job, JobPhase::Create, e)),
        };
        if let Err(e) = job.created(job_id.clone()) {
            return Err(PushFailure { job, error: e });
        }

        // Step 2: Upload chunks in order
        for (position, artifact) in artifacts.iter().enumerate() {
            info!(
                "[PUSH-ORCHESTRATOR] Uploading chunk {}/{} from {}",
                artifact.index + 1,
                total,
                artifact.path.display()
            );

            if let Err(e) = self.client.upload_chunk(&job_id, artifact).await {
                warn!(
                    "[PUSH-ORCHESTRATOR] Chunk {}/{} failed; skipping remaining uploads",
                    artifact.index + 1,
                    total
                );
                return Err(fail(job, JobPhase::Upload, e));
            }
            if let Err(e) = job.chunk_uploaded() {
                return Err(PushFailure { job, error: e });
            }

            info!(
                "[PUSH-ORCHESTRATOR] Chunk {}/{} uploaded successfully",
                artifact.index + 1,
                total
            );

            if position + 1 < total && !self.chunk_delay.is_zero() {
                info!(
                    "[PUSH-ORCHESTRATOR] Waiting {}ms before next chunk",
                    self.chunk_delay.as_millis()
                );
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        // Step 3: Execute
        if let Err(e) = self.client.execute_job(&job_id).await {
            return Err(fail(job, JobPhase::Execute, e));
        }
        if let Err(e) = job.executed() {
            return Err(PushFailure { job, error: e });
        }

        info!(
            "[PUSH-ORCHESTRATOR] Job {} executed successfully ({} chunk(s))",
            redact_id(&job_id),
            total
        );

        Ok(job)
    }
}

/// Moves `job` to `Failed` for `phase` and pairs it with `error`.
fn fail(mut job: PushJob, phase: JobPhase, error: PushError) -> PushFailure {
    if let Err(e) = job.fail(phase) {
        warn!("[PUSH-ORCHESTRATOR] {}", e);
    }
    match job.job_id() {
        Some(id) => warn!(
            "[PUSH-ORCHESTRATOR] {} phase failed; remote job {} is left as-is (no rollback): {}",
            phase,
            redact_id(id),
            error
        ),
        None => warn!("[PUSH-ORCHESTRATOR] {} phase failed: {}", phase, error),
    }
    PushFailure { job, error }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::state::PushState;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    // ─────────────────────────────────────────────────────────────────────────
    // Fake Implementation for Testing
    // ─────────────────────────────────────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Create(String),
        Upload(String, usize),
        Execute(String),
    }

    /// Fake client that records every call and fails where told to.
    #[derive(Clone, Default)]
    struct FakeJobClient {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_create: Option<u16>,
        fail_upload_at: Option<usize>,
        fail_execute: Option<u16>,
    }

    impl FakeJobClient {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn uploads(&self) -> Vec<usize> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Upload(_, i) => Some(i),
                    _ => None,
                })
                .collect()
        }

        fn executes(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Execute(_)))
                .count()
        }
    }

    impl JobClientOps for FakeJobClient {
        fn create_job<'a>(
            &'a self,
            target_name: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String, PushError>> + Send + 'a>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push(Call::Create(target_name.to_string()));
                match self.fail_create {
                    Some(status) => Err(PushError::remote(JobPhase::Create, status, "denied")),
                    None => Ok("fake-job-0001".to_string()),
                }
            })
        }

        fn upload_chunk<'a>(
            &'a self,
            job_id: &'a str,
            artifact: &'a PushArtifact,
        ) -> Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + 'a>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push(Call::Upload(job_id.to_string(), artifact.index));
                if self.fail_upload_at == Some(artifact.index) {
                    Err(PushError::Remote {
                        phase: JobPhase::Upload,
                        status: 500,
                        body: "chunk rejected".into(),
                        chunk_index: Some(artifact.index),
                    })
                } else {
                    Ok(())
                }
            })
        }

        fn execute_job<'a>(
            &'a self,
            job_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + 'a>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push(Call::Execute(job_id.to_string()));
                match self.fail_execute {
                    Some(status) => Err(PushError::remote(JobPhase::Execute, status, "nope")),
                    None => Ok(()),
                }
            })
        }
    }

    fn artifacts(n: usize) -> Vec<PushArtifact> {
        PushArtifact::sequence((1..=n).map(|i| PathBuf::from(format!("data_part_{}.parquet", i))))
    }

    fn orchestrator(client: FakeJobClient) -> PushOrchestrator<FakeJobClient> {
        PushOrchestrator::new(client, "pool-1", Duration::from_secs(3))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ordering and Call Counts
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn full_success_uploads_in_order_then_executes_once() {
        let client = FakeJobClient::default();
        let job = orchestrator(client.clone())
            .run("data.parquet", &artifacts(4))
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(calls.first(), Some(&Call::Create("data.parquet".into())));
        assert_eq!(client.uploads(), vec![0, 1, 2, 3]);
        assert_eq!(calls.last(), Some(&Call::Execute("fake-job-0001".into())));
        assert_eq!(client.executes(), 1);
        assert_eq!(calls.len(), 6);

        assert_eq!(
            job.state(),
            &PushState::Executed {
                job_id: "fake-job-0001".into(),
                chunks_uploaded: 4
            }
        );
        assert_eq!(job.target_name(), "data.parquet");
        assert_eq!(job.pool_id(), "pool-1");
    }

    #[tokio::test(start_paused = true)]
    async fn create_failure_makes_no_further_calls() {
        let client = FakeJobClient {
            fail_create: Some(401),
            ..Default::default()
        };

        let failure = orchestrator(client.clone())
            .run("data.parquet", &artifacts(3))
            .await
            .unwrap_err();

        assert!(client.uploads().is_empty());
        assert_eq!(client.executes(), 0);
        assert!(matches!(
            failure.error,
            PushError::Remote {
                phase: JobPhase::Create,
                status: 401,
                ..
            }
        ));
        assert_eq!(
            failure.job.state(),
            &PushState::Failed {
                job_id: None,
                phase: JobPhase::Create
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_of_three_upload_failure_skips_rest_and_execute() {
        let client = FakeJobClient {
            fail_upload_at: Some(1),
            ..Default::default()
        };

        let failure = orchestrator(client.clone())
            .run("data.parquet", &artifacts(3))
            .await
            .unwrap_err();

        assert_eq!(client.uploads(), vec![0, 1]);
        assert_eq!(client.executes(), 0);
        assert!(matches!(
            failure.error,
            PushError::Remote {
                phase: JobPhase::Upload,
                chunk_index: Some(1),
                ..
            }
        ));
        assert_eq!(
            failure.job.state(),
            &PushState::Failed {
                job_id: Some("fake-job-0001".into()),
                phase: JobPhase::Upload
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn execute_failure_is_reported_with_job_id() {
        let client = FakeJobClient {
            fail_execute: Some(503),
            ..Default::default()
        };

        let failure = orchestrator(client.clone())
            .run("data.parquet", &artifacts(2))
            .await
            .unwrap_err();

        assert_eq!(client.uploads(), vec![0, 1]);
        assert_eq!(client.executes(), 1);
        assert_eq!(failure.job.job_id(), Some("fake-job-0001"));
        assert!(matches!(
            failure.error,
            PushError::Remote {
                phase: JobPhase::Execute,
                ..
            }
        ));
        assert_eq!(failure.to_string(), failure.error.to_string());
    }

    #[tokio::test]
    async fn empty_artifact_list_is_rejected_before_any_call() {
        let client = FakeJobClient::default();
        let failure = orchestrator(client.clone())
            .run("data.parquet", &[])
            .await
            .unwrap_err();

        assert!(client.calls().is_empty());
        assert!(matches!(failure.error, PushError::Configuration(_)));
        assert_eq!(failure.job.state(), &PushState::Pending);
    }

    #[tokio::test]
    async fn out_of_order_artifacts_are_rejected_before_any_call() {
        let client = FakeJobClient::default();
        let mut shuffled = artifacts(3);
        shuffled.swap(0, 2);

        let failure = orchestrator(client.clone())
            .run("data.parquet", &shuffled)
            .await
            .unwrap_err();

        assert!(client.calls().is_empty());
        assert!(matches!(failure.error, PushError::Internal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unflagged_final_artifact_is_rejected_before_any_call() {
        let client = FakeJobClient::default();
        let unflagged = vec![
            PushArtifact::new(PathBuf::from("data_part_1.parquet"), 0, false),
            PushArtifact::new(PathBuf::from("data_part_2.parquet"), 1, false),
        ];
        let start = Instant::now();

        let failure = orchestrator(client.clone())
            .run("data.parquet", &unflagged)
            .await
            .unwrap_err();

        assert!(client.calls().is_empty());
        assert!(matches!(failure.error, PushError::Internal(_)));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn early_last_flag_is_rejected_before_any_call() {
        let client = FakeJobClient::default();
        let mut flagged = artifacts(3);
        flagged[1].is_last = true;

        let failure = orchestrator(client.clone())
            .run("data.parquet", &flagged)
            .await
            .unwrap_err();

        assert!(client.calls().is_empty());
        assert!(matches!(failure.error, PushError::Internal(_)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pacing
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn single_chunk_waits_for_nothing() {
        let client = FakeJobClient::default();
        let start = Instant::now();

        orchestrator(client.clone())
            .run("data.parquet", &artifacts(1))
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(client.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn ten_chunks_wait_nine_times() {
        let client = FakeJobClient::default();
        let start = Instant::now();

        orchestrator(client.clone())
            .run("data.parquet", &artifacts(10))
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(3 * 9));
        assert_eq!(client.uploads(), (0..10).collect::<Vec<_>>());
        assert_eq!(client.executes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_upload_does_not_wait_afterwards() {
        let client = FakeJobClient {
            fail_upload_at: Some(1),
            ..Default::default()
        };
        let start = Instant::now();

        let _ = orchestrator(client)
            .run("data.parquet", &artifacts(3))
            .await;

        // One pause between chunk 1 and chunk 2, none after the failure.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_configurable() {
        let client = FakeJobClient::default();
        let start = Instant::now();

        PushOrchestrator::new(client, "pool-1", Duration::from_millis(250))
            .run("data.parquet", &artifacts(3))
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }
}
