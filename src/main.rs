//! parquet-push CLI: converts files and pushes each as its own delta job.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info};

use parquet_push::{
    init_tracing, submit, CliArgs, Credentials, PushError, PushSettings, SubmissionReceipt,
    SubmissionScheduler,
};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let _log_guard = match init_tracing(args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let settings = args.settings();
    if let Err(e) = settings.validate() {
        eprintln!("{}", e.to_presentation().message);
        return ExitCode::FAILURE;
    }

    let scheduler = match SubmissionScheduler::new(settings.max_concurrent_submissions) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Pushing {} file(s), at most {} at a time",
        args.files.len(),
        settings.max_concurrent_submissions
    );

    let settings = Arc::new(settings);
    let credentials = Arc::new(args.credentials());

    let mut submissions = JoinSet::new();
    for source in args.files.iter().cloned() {
        let settings = Arc::clone(&settings);
        let credentials = Arc::clone(&credentials);
        let scheduler = scheduler.clone();
        submissions.spawn(async move {
            let result = run_submission(&scheduler, &settings, &credentials, &source).await;
            (source, result)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = submissions.join_next().await {
        match joined {
            Ok((source, Ok(receipt))) => {
                println!(
                    "{}: job {} target {} ({} rows, {} chunk(s))",
                    source.display(),
                    receipt.job_id,
                    receipt.target_name,
                    receipt.row_count,
                    receipt.chunk_count
                );
            }
            Ok((source, Err(e))) => {
                failed += 1;
                let presentation = e.to_presentation();
                error!("[SUBMISSION] {} failed: {}", source.display(), e);
                eprintln!(
                    "{}: {}: {}",
                    source.display(),
                    presentation.title,
                    presentation.message
                );
            }
            Err(e) => {
                failed += 1;
                error!("[SUBMISSION] Task join error: {}", e);
                eprintln!("Submission task failed: {e}");
            }
        }
    }

    if failed > 0 {
        eprintln!("{} of {} submission(s) failed", failed, args.files.len());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Runs one submission while holding a scheduler slot.
async fn run_submission(
    scheduler: &SubmissionScheduler,
    settings: &PushSettings,
    credentials: &Credentials,
    source: &Path,
) -> Result<SubmissionReceipt, PushError> {
    let _permit = scheduler.acquire().await?;
    submit(settings, credentials, source).await
}
