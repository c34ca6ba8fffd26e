//! Data-push REST client: create job, upload chunk, execute job.
//!
//! # Security
//!
//! - File contents are never logged
//! - Auth headers and tokens are never logged
//! - Only HTTP method, path, and status codes are logged

use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::io::{InspectReader, ReaderStream};
use tracing::{info, warn};
use url::Url;

use crate::config::Endpoint;
use crate::error::{JobPhase, PushError};
use crate::push::PushArtifact;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all data-push requests.
const CLIENT_USER_AGENT: &str = concat!("parquet-push/", env!("CARGO_PKG_VERSION"));

/// Path prefix of the data-push API.
pub const DATA_PUSH_API_PATH: &str = "/integration/api/v1/data-push";

/// Multipart field name carrying the chunk file.
const CHUNK_FIELD_NAME: &str = "file";

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for creating a data-push job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    /// Job type; always `DELTA` (upsert load).
    #[serde(rename = "type")]
    pub job_type: &'static str,
    /// File format of the uploaded chunks; always `PARQUET`.
    pub file_type: &'static str,
    /// Display name of the pushed data inside the pool.
    pub target_name: String,
    /// Destination pool id, repeated in the body.
    pub data_pool_id: String,
}

impl CreateJobRequest {
    pub fn delta_parquet(target_name: impl Into<String>, pool_id: impl Into<String>) -> Self {
        Self {
            job_type: "DELTA",
            file_type: "PARQUET",
            target_name: target_name.into(),
            data_pool_id: pool_id.into(),
        }
    }
}

/// The part of the job resource this client reads back.
#[derive(Debug, Clone, Deserialize)]
struct JobCreatedResponse {
    id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// DataPushClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the three data-push job operations.
///
/// Holds the normalized endpoint of one submission; URLs are composed from
/// it without further normalization.
///
/// `timeout` bounds connecting and the whole of a create or execute call.
/// A chunk upload has no total deadline: it fails once the body has sent
/// nothing for `timeout`, or the response has not arrived `timeout` after
/// the last byte went out.
#[derive(Clone)]
pub struct DataPushClient {
    http: Client,
    endpoint: Endpoint,
    timeout: Duration,
}

impl DataPushClient {
    /// Creates a client with its own HTTP connection pool.
    ///
    /// # Errors
    ///
    /// Returns `PushError::Internal` if the HTTP client fails to initialize.
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, PushError> {
        let http = build_http_client(timeout)?;
        Ok(Self {
            http,
            endpoint,
            timeout,
        })
    }

    /// Creates a new delta job for `target_name`.
    ///
    /// # Returns
    ///
    /// The job id assigned by the endpoint.
    ///
    /// # Errors
    ///
    /// - `PushError::Remote` - non-200 response, or a 200 without a job id
    /// - `PushError::ConnectionFailed` - network error
    pub async fn create_job(&self, target_name: &str) -> Result<String, PushError> {
        let url = self.build_jobs_url()?;
        let body = CreateJobRequest::delta_parquet(target_name, self.endpoint.pool_id());

        info!(
            "[DATA-PUSH] POST {} (creating job for target {})",
            url.path(),
            target_name
        );

        let start = Instant::now();
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(self.endpoint.token().expose_secret())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| connection_failed(JobPhase::Create, e))?;

        let status = response.status();
        info!(
            "[DATA-PUSH] POST {} -> {} {}ms",
            url.path(),
            status.as_u16(),
            start.elapsed().as_millis()
        );

        let text = read_body(response).await;
        if status != StatusCode::OK {
            return Err(PushError::remote(JobPhase::Create, status.as_u16(), text));
        }

        let created: JobCreatedResponse = serde_json::from_str(&text).map_err(|e| {
            warn!("[DATA-PUSH] Job creation response has no usable id: {}", e);
            PushError::remote(JobPhase::Create, status.as_u16(), text.clone())
        })?;

        info!("[DATA-PUSH] Job created: {}", redact_id(&created.id));
        Ok(created.id)
    }

    /// Streams one chunk artifact to the job's upserted-chunks resource.
    ///
    /// The file is opened here and its handle is released as soon as the
    /// request completes, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - `PushError::Io` - the file cannot be opened (no request is sent)
    /// - `PushError::Remote` - non-200 response, carrying the chunk index
    /// - `PushError::ConnectionFailed` - network error
    pub async fn upload_chunk(
        &self,
        job_id: &str,
        artifact: &PushArtifact,
    ) -> Result<(), PushError> {
        let url = self.build_chunks_url(job_id)?;
        let (progress, progress_rx) = watch::channel(());
        let part = file_part(&artifact.path, progress).await?;
        let form = Form::new().part(CHUNK_FIELD_NAME, part);

        info!(
            "[DATA-PUSH] POST {} (chunk {})",
            redacted_path(&url, job_id),
            artifact.index + 1
        );

        let start = Instant::now();
        let request = self
            .http
            .post(url.clone())
            .bearer_auth(self.endpoint.token().expose_secret())
            .multipart(form)
            .send();

        let response = tokio::select! {
            result = request => result.map_err(|e| connection_failed(JobPhase::Upload, e))?,
            () = upload_stalled(progress_rx, self.timeout) => {
                warn!(
                    "[DATA-PUSH] Chunk {} made no progress for {}ms",
                    artifact.index + 1,
                    self.timeout.as_millis()
                );
                return Err(PushError::ConnectionFailed {
                    phase: JobPhase::Upload,
                    message: "request timed out".to_string(),
                });
            }
        };

        let status = response.status();
        info!(
            "[DATA-PUSH] POST {} -> {} {}ms",
            redacted_path(&url, job_id),
            status.as_u16(),
            start.elapsed().as_millis()
        );

        if status != StatusCode::OK {
            let body = tokio::time::timeout(self.timeout, read_body(response))
                .await
                .unwrap_or_else(|_| String::from("Unable to read response body"));
            return Err(PushError::Remote {
                phase: JobPhase::Upload,
                status: status.as_u16(),
                body,
                chunk_index: Some(artifact.index),
            });
        }

        Ok(())
    }

    /// Executes the job so the endpoint applies the uploaded chunks.
    ///
    /// # Errors
    ///
    /// - `PushError::Remote` - non-200 response
    /// - `PushError::ConnectionFailed` - network error
    pub async fn execute_job(&self, job_id: &str) -> Result<(), PushError> {
        let url = self.build_job_url(job_id)?;

        info!("[DATA-PUSH] POST {} (executing)", redacted_path(&url, job_id));

        let start = Instant::now();
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(self.endpoint.token().expose_secret())
            .timeout(self.timeout)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| connection_failed(JobPhase::Execute, e))?;

        let status = response.status();
        info!(
            "[DATA-PUSH] POST {} -> {} {}ms",
            redacted_path(&url, job_id),
            status.as_u16(),
            start.elapsed().as_millis()
        );

        if status != StatusCode::OK {
            return Err(PushError::remote(
                JobPhase::Execute,
                status.as_u16(),
                read_body(response).await,
            ));
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Builders
    // ─────────────────────────────────────────────────────────────────────────

    /// Builds the jobs collection URL: {base}/integration/api/v1/data-push/{pool}/jobs/
    fn build_jobs_url(&self) -> Result<Url, PushError> {
        let raw = format!(
            "{}{}/{}/jobs/",
            self.endpoint.base(),
            DATA_PUSH_API_PATH,
            self.endpoint.pool_id()
        );
        Url::parse(&raw).map_err(|e| PushError::Configuration(format!("invalid jobs URL: {}", e)))
    }

    /// Builds a specific job URL: .../jobs/{job_id}
    fn build_job_url(&self, job_id: &str) -> Result<Url, PushError> {
        let raw = format!("{}{}", self.build_jobs_url()?, job_id);
        Url::parse(&raw).map_err(|e| PushError::Internal(format!("invalid job URL: {}", e)))
    }

    /// Builds the chunk URL: .../jobs/{job_id}/chunks/upserted
    fn build_chunks_url(&self, job_id: &str) -> Result<Url, PushError> {
        let raw = format!("{}{}/chunks/upserted", self.build_jobs_url()?, job_id);
        Url::parse(&raw).map_err(|e| PushError::Internal(format!("invalid chunks URL: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the HTTP client used for one submission. Only connecting is
/// bounded here; request deadlines are set per call.
fn build_http_client(connect_timeout: Duration) -> Result<Client, PushError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    Client::builder()
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| PushError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Opens `path` and wraps it in a streaming multipart part. Every read from
/// the file notifies `progress`.
async fn file_part(path: &Path, progress: watch::Sender<()>) -> Result<Part, PushError> {
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        PushError::Io(format!("Failed to open chunk {}: {}", path.display(), e))
    })?;
    let length = file
        .metadata()
        .await
        .map_err(|e| PushError::Io(format!("Failed to read chunk metadata: {}", e)))?
        .len();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chunk.parquet".to_string());

    let reader = InspectReader::new(file, move |_| progress.send_replace(()));
    let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
    Ok(Part::stream_with_length(body, length).file_name(file_name))
}

/// Resolves once the upload body has made no progress for `idle`, or once
/// `idle` has passed since the body was fully read.
async fn upload_stalled(mut progress: watch::Receiver<()>, idle: Duration) {
    loop {
        match tokio::time::timeout(idle, progress.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => break,
            Err(_) => return,
        }
    }
    tokio::time::sleep(idle).await;
}

async fn read_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| String::from("Unable to read response body"))
}

fn connection_failed(phase: JobPhase, err: reqwest::Error) -> PushError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "could not connect".to_string()
    } else {
        "request failed".to_string()
    };
    warn!(
        "[DATA-PUSH] {} request failed: {}: {}",
        phase,
        message,
        error_chain(&err.without_url())
    );
    PushError::ConnectionFailed { phase, message }
}

/// `err` followed by each of its sources, separated by `: `.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

/// Path of `url` with the job id shortened for logging.
fn redacted_path(url: &Url, job_id: &str) -> String {
    url.path().replace(job_id, &redact_id(job_id))
}

/// Redacts a job ID for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((cut, _)) => format!("{}...", &id[..cut]),
        None => id.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
