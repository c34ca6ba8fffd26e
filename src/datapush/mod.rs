//! Remote data-push job API.

pub mod client;

pub use client::{CreateJobRequest, DataPushClient, DATA_PUSH_API_PATH};
