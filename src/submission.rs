//! One submission end to end: convert, record, size, split, push.

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::columnar::{convert_to_parquet, split_dataset, SizePolicy, SourceFormat};
use crate::config::{Credentials, Endpoint, PushSettings};
use crate::datapush::DataPushClient;
use crate::error::PushError;
use crate::push::{JobClientOps, PushArtifact, PushOrchestrator};

/// What a caller gets back from a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub job_id: String,
    pub target_name: String,
    pub row_count: u64,
    pub chunk_count: usize,
}

/// The per-submission audit record, emitted once after conversion and
/// before the push starts.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub base_url: String,
    pub pool_id: String,
    pub parquet_file: String,
    pub rows: u64,
    pub timestamp: String,
}

impl TransactionRecord {
    pub fn new(endpoint: &Endpoint, parquet_file: &str, rows: u64) -> Self {
        Self {
            base_url: endpoint.base().to_string(),
            pool_id: endpoint.pool_id().to_string(),
            parquet_file: parquet_file.to_string(),
            rows,
            timestamp: Local::now().to_rfc3339(),
        }
    }

    pub fn emit(&self) {
        info!(
            base_url = %self.base_url,
            pool_id = %self.pool_id,
            parquet_file = %self.parquet_file,
            rows = self.rows,
            timestamp = %self.timestamp,
            "[SUBMISSION] TRANSACTION"
        );
    }
}

/// Converts `source` and pushes it as one delta job.
///
/// Credentials are validated before any file is touched. Each call builds
/// its own HTTP client, so independent submissions share nothing.
///
/// # Errors
///
/// Any `PushError`; a failure after job creation leaves the remote job as
/// it is (see [`PushOrchestrator::run`]).
pub async fn submit(
    settings: &PushSettings,
    credentials: &Credentials,
    source: &Path,
) -> Result<SubmissionReceipt, PushError> {
    settings.validate()?;
    let endpoint = credentials.normalize()?;
    let client = DataPushClient::new(endpoint.clone(), settings.request_timeout())?;

    submit_with_client(settings, &endpoint, client, source).await
}

/// [`submit`] with a caller-provided job client.
///
/// Artifacts are written to a fresh `<stem>-XXXXXX` directory inside the
/// upload directory, so submissions of same-named sources never share files.
pub async fn submit_with_client<C: JobClientOps>(
    settings: &PushSettings,
    endpoint: &Endpoint,
    client: C,
    source: &Path,
) -> Result<SubmissionReceipt, PushError> {
    settings.validate()?;
    SourceFormat::from_path(source)?;

    let work_dir = submission_dir(&settings.upload_dir, source).await?;
    let converted = convert_to_parquet(source, &work_dir).await?;
    let dataset = &converted.dataset;

    TransactionRecord::new(endpoint, &converted.file_name, dataset.row_count).emit();

    let decision = SizePolicy::from_settings(settings).decide(dataset.byte_size);
    let paths: Vec<PathBuf> = if decision.is_split() {
        info!(
            "[SUBMISSION] File size {} bytes > {} bytes. Splitting into {} chunks.",
            dataset.byte_size, settings.split_threshold_bytes, decision.count
        );
        split_dataset(dataset, decision.count, &work_dir)
            .await?
            .into_iter()
            .map(|part| part.path)
            .collect()
    } else {
        vec![dataset.path.clone()]
    };

    let artifacts = PushArtifact::sequence(paths);
    let orchestrator = PushOrchestrator::new(client, endpoint.pool_id(), settings.chunk_delay());
    let job = orchestrator.run(&converted.file_name, &artifacts).await?;

    let job_id = job
        .job_id()
        .map(str::to_string)
        .ok_or_else(|| PushError::Internal("executed job has no id".to_string()))?;

    Ok(SubmissionReceipt {
        job_id,
        target_name: converted.file_name.clone(),
        row_count: dataset.row_count,
        chunk_count: artifacts.len(),
    })
}

/// Creates and keeps a unique directory for one submission's artifacts.
async fn submission_dir(upload_dir: &Path, source: &Path) -> Result<PathBuf, PushError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| PushError::Io(format!("Failed to create upload directory: {}", e)))?;

    let prefix = format!(
        "{}-",
        source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "submission".to_string())
    );
    let dir = tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir_in(upload_dir)
        .map_err(|e| PushError::Io(format!("Failed to create submission directory: {}", e)))?;

    Ok(dir.keep())
}
