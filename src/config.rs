//! Explicit per-submission configuration.
//!
//! `PushSettings` carries the tuning knobs of the pipeline and `Credentials`
//! carries what the caller supplies for one submission. Nothing here is
//! process-wide state: each submission receives its own values.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::PushError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Default connect and read-idle timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Pause between successive chunk uploads.
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 3_000;

/// Number of parts an oversized artifact is split into.
pub const DEFAULT_SPLIT_COUNT: usize = 10;

/// Default limit on independent submissions running at once.
pub const DEFAULT_MAX_CONCURRENT_SUBMISSIONS: usize = 3;

// ─────────────────────────────────────────────────────────────────────────────
// PushSettings
// ─────────────────────────────────────────────────────────────────────────────

/// Tuning parameters for a submission.
#[derive(Debug, Clone)]
pub struct PushSettings {
    /// Directory where converted and split artifacts are written.
    pub upload_dir: PathBuf,
    /// Connect timeout, and the longest a request may go without reading
    /// anything back. Not a cap on a whole chunk upload.
    pub request_timeout_secs: u64,
    /// Delay between two successive chunk uploads (never after the last one).
    pub chunk_delay_ms: u64,
    /// Artifacts strictly larger than this are split.
    pub split_threshold_bytes: u64,
    /// Number of parts an oversized artifact is split into.
    pub split_count: usize,
    /// Upper bound on submissions running concurrently.
    pub max_concurrent_submissions: usize,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
            split_threshold_bytes: GIB,
            split_count: DEFAULT_SPLIT_COUNT,
            max_concurrent_submissions: DEFAULT_MAX_CONCURRENT_SUBMISSIONS,
        }
    }
}

impl PushSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    /// Sets the upload directory.
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Sets the inter-chunk delay.
    pub fn chunk_delay_ms(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = ms;
        self
    }

    /// Sets the split threshold.
    pub fn split_threshold_bytes(mut self, bytes: u64) -> Self {
        self.split_threshold_bytes = bytes;
        self
    }

    /// Sets the split count.
    pub fn split_count(mut self, count: usize) -> Self {
        self.split_count = count;
        self
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PushError> {
        if self.split_count == 0 {
            return Err(PushError::Configuration(
                "split count must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(PushError::Configuration(
                "request timeout must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_submissions == 0 {
            return Err(PushError::Configuration(
                "max concurrent submissions must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-supplied connection details for one submission.
///
/// The token is wrapped in `SecretString` so it cannot leak through `Debug`.
#[derive(Clone)]
pub struct Credentials {
    /// Endpoint base URL, with or without scheme.
    pub base_url: String,
    /// Destination data pool id.
    pub pool_id: String,
    /// API bearer token.
    pub token: SecretString,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("pool_id", &self.pool_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    pub fn new(
        base_url: impl Into<String>,
        pool_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            pool_id: pool_id.into(),
            token: SecretString::from(token.into()),
        }
    }

    /// Validates the credentials and normalizes the base URL.
    ///
    /// # Errors
    ///
    /// Returns `PushError::Configuration` if any field is empty or the base
    /// URL cannot be parsed.
    pub fn normalize(&self) -> Result<Endpoint, PushError> {
        let base_url = self.base_url.trim();
        let pool_id = self.pool_id.trim();
        let token = self.token.expose_secret().trim();

        if base_url.is_empty() {
            return Err(PushError::Configuration("base URL is required".to_string()));
        }
        if pool_id.is_empty() {
            return Err(PushError::Configuration("pool id is required".to_string()));
        }
        if token.is_empty() {
            return Err(PushError::Configuration("API token is required".to_string()));
        }

        let base = normalize_base_url(base_url)?;

        Ok(Endpoint {
            base,
            pool_id: pool_id.to_string(),
            token: SecretString::from(token.to_string()),
        })
    }
}

/// Adds `https://` when the endpoint has no scheme and strips trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String, PushError> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    let normalized = with_scheme.trim_end_matches('/').to_string();

    let parsed = Url::parse(&normalized)
        .map_err(|e| PushError::Configuration(format!("invalid base URL: {}", e)))?;
    if parsed.host_str().is_none() {
        return Err(PushError::Configuration(
            "base URL has no host".to_string(),
        ));
    }

    Ok(normalized)
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoint
// ─────────────────────────────────────────────────────────────────────────────

/// Validated, normalized connection details. Produced once per submission.
#[derive(Clone)]
pub struct Endpoint {
    base: String,
    pool_id: String,
    token: SecretString,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("base", &self.base)
            .field("pool_id", &self.pool_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Endpoint {
    /// Normalized base URL without trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn pool_id(&self) -> &str {
        &self.pool_id
    }

    pub(crate) fn token(&self) -> &SecretString {
        &self.token
    }
}
