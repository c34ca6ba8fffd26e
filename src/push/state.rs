//! Lifecycle of one remote push job.
//!
//! The state is an explicit tagged value. Transitions only move forward
//! (`Pending → Created → Uploading → Executed`); `Failed` is reachable from
//! every non-terminal state and is never left. Any other transition is
//! rejected with `PushError::Internal`.

use serde::Serialize;

use crate::error::{JobPhase, PushError};

/// State of a push job as seen by this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PushState {
    /// The job has not been created remotely yet.
    Pending,
    /// The endpoint assigned a job id; no chunk uploaded yet.
    Created { job_id: String },
    /// At least one chunk uploaded.
    Uploading { job_id: String, chunks_uploaded: usize },
    /// The job was executed. Terminal.
    Executed { job_id: String, chunks_uploaded: usize },
    /// A phase failed. Terminal. `job_id` is set when the remote job exists.
    Failed {
        job_id: Option<String>,
        phase: JobPhase,
    },
}

impl PushState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushState::Pending => "Pending",
            PushState::Created { .. } => "Created",
            PushState::Uploading { .. } => "Uploading",
            PushState::Executed { .. } => "Executed",
            PushState::Failed { .. } => "Failed",
        }
    }

    /// Returns true if this is a terminal state (job cannot transition further).
    pub fn is_terminal(&self) -> bool {
        matches!(self, PushState::Executed { .. } | PushState::Failed { .. })
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            PushState::Pending => None,
            PushState::Created { job_id }
            | PushState::Uploading { job_id, .. }
            | PushState::Executed { job_id, .. } => Some(job_id),
            PushState::Failed { job_id, .. } => job_id.as_deref(),
        }
    }
}

/// The remote job's identity and state for one submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushJob {
    target_name: String,
    pool_id: String,
    #[serde(flatten)]
    state: PushState,
}

impl PushJob {
    pub fn new(target_name: impl Into<String>, pool_id: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            pool_id: pool_id.into(),
            state: PushState::Pending,
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn pool_id(&self) -> &str {
        &self.pool_id
    }

    pub fn state(&self) -> &PushState {
        &self.state
    }

    pub fn job_id(&self) -> Option<&str> {
        self.state.job_id()
    }

    /// Records the job id assigned by the endpoint. Valid from `Pending` only.
    pub fn created(&mut self, job_id: impl Into<String>) -> Result<(), PushError> {
        match self.state {
            PushState::Pending => {
                self.state = PushState::Created {
                    job_id: job_id.into(),
                };
                Ok(())
            }
            _ => Err(self.illegal("created")),
        }
    }

    /// Records one successful chunk upload. Valid from `Created` or `Uploading`.
    pub fn chunk_uploaded(&mut self) -> Result<(), PushError> {
        let next = match &self.state {
            PushState::Created { job_id } => PushState::Uploading {
                job_id: job_id.clone(),
                chunks_uploaded: 1,
            },
            PushState::Uploading {
                job_id,
                chunks_uploaded,
            } => PushState::Uploading {
                job_id: job_id.clone(),
                chunks_uploaded: chunks_uploaded + 1,
            },
            _ => return Err(self.illegal("chunk_uploaded")),
        };
        self.state = next;
        Ok(())
    }

    /// Marks the job executed. Valid from `Uploading` only, so a job can
    /// never be executed before at least one chunk went up.
    pub fn executed(&mut self) -> Result<(), PushError> {
        let next = match &self.state {
            PushState::Uploading {
                job_id,
                chunks_uploaded,
            } => PushState::Executed {
                job_id: job_id.clone(),
                chunks_uploaded: *chunks_uploaded,
            },
            _ => return Err(self.illegal("executed")),
        };
        self.state = next;
        Ok(())
    }

    /// Moves a non-terminal job to `Failed`. A failed job stays failed.
    pub fn fail(&mut self, phase: JobPhase) -> Result<(), PushError> {
        if self.state.is_terminal() {
            return Err(self.illegal("fail"));
        }
        let job_id = self.state.job_id().map(str::to_string);
        self.state = PushState::Failed { job_id, phase };
        Ok(())
    }

    fn illegal(&self, transition: &str) -> PushError {
        PushError::Internal(format!(
            "illegal push job transition '{}' from state {}",
            transition,
            self.state.as_str()
        ))
    }
}
