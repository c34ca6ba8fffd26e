use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "access_token",
    "api_key",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// The remote job phase a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobPhase {
    Create,
    Upload,
    Execute,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Create => "create",
            JobPhase::Upload => "upload",
            JobPhase::Execute => "execute",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-friendly error presentation for CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Error type shared by every stage of a submission.
#[derive(Debug, Error)]
pub enum PushError {
    // ── Caller input ──────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── Local files ───────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Unsupported or corrupt file: {0}")]
    Format(String),

    // ── Remote endpoint ───────────────────────────────────────────────────────
    #[error("{}", remote_message(.phase, .status, .body, .chunk_index))]
    Remote {
        phase: JobPhase,
        status: u16,
        body: String,
        /// 0-based index of the failing chunk (upload phase only).
        chunk_index: Option<usize>,
    },

    #[error("Connection failed during {phase}: {message}")]
    ConnectionFailed { phase: JobPhase, message: String },

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

fn remote_message(phase: &JobPhase, status: &u16, body: &str, chunk_index: &Option<usize>) -> String {
    match (phase, chunk_index) {
        (JobPhase::Upload, Some(index)) => format!(
            "Failed to upload chunk {}. Status: {}, Response: {}",
            index + 1,
            status,
            body
        ),
        _ => format!(
            "Failed to {} job. Status: {}, Response: {}",
            phase, status, body
        ),
    }
}

impl PushError {
    /// Builds a remote error for a non-200 response.
    pub fn remote(phase: JobPhase, status: u16, body: impl Into<String>) -> Self {
        PushError::Remote {
            phase,
            status,
            body: body.into(),
            chunk_index: None,
        }
    }

    /// Converts the error into a presentation suitable for display.
    /// Never leaks tokens or authorization headers.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            PushError::Configuration(msg) => ErrorPresentation {
                title: "Missing Configuration".into(),
                message: sanitize_message(msg, "A required setting is missing or invalid."),
                action: Some("Check the base URL, pool id and API token".into()),
            },

            PushError::Io(msg) => ErrorPresentation {
                title: "File Error".into(),
                message: sanitize_message(msg, "A local file could not be read or written."),
                action: Some("Check that the file exists and the upload directory is writable".into()),
            },

            PushError::Format(msg) => ErrorPresentation {
                title: "Unsupported File".into(),
                message: sanitize_message(msg, "The file could not be converted."),
                action: Some("Use a CSV, TSV or tab-separated TXT file".into()),
            },

            PushError::Remote {
                phase,
                status,
                body,
                chunk_index,
            } => {
                let title = match phase {
                    JobPhase::Create => "Job Creation Failed",
                    JobPhase::Upload => "Chunk Upload Failed",
                    JobPhase::Execute => "Job Execution Failed",
                };
                let action = if *status == 401 || *status == 403 {
                    "Check that the API token is valid for this pool"
                } else {
                    "Review the response and try again"
                };
                let full = remote_message(phase, status, body, chunk_index);
                let fallback = format!("The {} request returned HTTP {}.", phase, status);
                ErrorPresentation {
                    title: title.into(),
                    message: sanitize_message(&full, &fallback),
                    action: Some(action.into()),
                }
            }

            PushError::ConnectionFailed { phase, .. } => ErrorPresentation {
                title: "Connection Failed".into(),
                message: format!(
                    "Could not reach the data-push endpoint during the {} phase.",
                    phase
                ),
                action: Some("Check network and retry".into()),
            },

            PushError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}
