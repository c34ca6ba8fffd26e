//! Bound on how many submissions run at once.
//!
//! Submissions share no job, client or chunk sequence, so the only thing
//! coordinated here is the count.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::PushError;

/// Hands out one slot per running submission. Clones share the same slots.
#[derive(Clone)]
pub struct SubmissionScheduler {
    sem: Arc<Semaphore>,
}

/// A held slot; dropping it lets the next waiting submission start.
pub struct SubmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl SubmissionScheduler {
    /// # Errors
    ///
    /// Returns `PushError::Configuration` if `max_concurrent` is 0.
    pub fn new(max_concurrent: usize) -> Result<Self, PushError> {
        if max_concurrent == 0 {
            return Err(PushError::Configuration(
                "max concurrent submissions must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            sem: Arc::new(Semaphore::new(max_concurrent)),
        })
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<SubmissionPermit, PushError> {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PushError::Internal("submission scheduler closed".to_string()))?;

        Ok(SubmissionPermit { _permit: permit })
    }
}
