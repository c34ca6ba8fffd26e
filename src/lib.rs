//! Tabular file → Parquet → data-push job pipeline.
//!
//! A submission converts one delimited text file to Parquet, splits it into
//! a fixed number of parts when it is too large, and publishes the part(s)
//! as the chunks of a single delta job (create, upload in order, execute).

pub mod cli;
pub mod columnar;
pub mod config;
pub mod datapush;
pub mod error;
pub mod logging;
pub mod push;
pub mod submission;

pub use cli::CliArgs;
pub use config::{Credentials, Endpoint, PushSettings};
pub use error::{ErrorPresentation, JobPhase, PushError};
pub use logging::init_tracing;
pub use push::{PushFailure, PushJob, PushOrchestrator, PushState, SubmissionScheduler};
pub use submission::{submit, submit_with_client, SubmissionReceipt};
