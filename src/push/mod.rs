//! Push job lifecycle and orchestration.

pub mod artifact;
pub mod orchestrator;
pub mod scheduler;
pub mod state;

pub use artifact::PushArtifact;
pub use orchestrator::{JobClientOps, PushFailure, PushOrchestrator};
pub use scheduler::{SubmissionPermit, SubmissionScheduler};
pub use state::{PushJob, PushState};
