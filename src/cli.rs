//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{
    Credentials, PushSettings, DEFAULT_CHUNK_DELAY_MS, DEFAULT_MAX_CONCURRENT_SUBMISSIONS,
    DEFAULT_SPLIT_COUNT, DEFAULT_TIMEOUT_SECS, GIB,
};

/// Convert tabular files to Parquet and push each one as a delta job.
#[derive(Parser)]
#[command(name = "parquet-push", version, about)]
pub struct CliArgs {
    /// Endpoint base URL (https:// is assumed when no scheme is given)
    #[arg(long, env = "DATA_PUSH_BASE_URL")]
    pub base_url: String,

    /// Destination data pool id
    #[arg(long, env = "DATA_PUSH_POOL_ID")]
    pub pool_id: String,

    /// API bearer token
    #[arg(long, env = "DATA_PUSH_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Directory for converted and split Parquet files, one subdirectory per
    /// submitted file
    #[arg(long, default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Timeout in seconds for connecting and for create/execute calls; chunk
    /// uploads fail only after this long without progress
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Pause between chunk uploads in milliseconds
    #[arg(long, default_value_t = DEFAULT_CHUNK_DELAY_MS)]
    pub chunk_delay_ms: u64,

    /// Number of parts an oversized file is split into
    #[arg(long, default_value_t = DEFAULT_SPLIT_COUNT)]
    pub split_count: usize,

    /// Files larger than this many bytes are split
    #[arg(long, default_value_t = GIB)]
    pub split_threshold_bytes: u64,

    /// Maximum number of files pushed at the same time
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_SUBMISSIONS)]
    pub max_concurrent: usize,

    /// Also write JSON logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// CSV, TSV or tab-separated TXT files to push
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl CliArgs {
    pub fn settings(&self) -> PushSettings {
        PushSettings {
            upload_dir: self.upload_dir.clone(),
            request_timeout_secs: self.timeout_secs,
            chunk_delay_ms: self.chunk_delay_ms,
            split_threshold_bytes: self.split_threshold_bytes,
            split_count: self.split_count,
            max_concurrent_submissions: self.max_concurrent,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.base_url, &self.pool_id, &self.token)
    }
}
