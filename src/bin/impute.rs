// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! `impute`: upload CSV files for imputation and manage the resulting jobs.

use clap::{Parser, Subcommand};
use impute_portal::services::{ImputationApi, ImputationClient};
use impute_portal::uploader::{FilesApiClient, UploadFlow, UploadPhase};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the portal API
    #[arg(long, env = "IMPUTE_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Base URL of the imputation service
    #[arg(
        long,
        env = "IMPUTATION_SERVICE_URL",
        default_value = "http://localhost:8000"
    )]
    service_url: String,

    /// Per-request timeout for the imputation service, in seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a CSV file, register the job and wait for it to finish
    Upload {
        file: PathBuf,
        #[arg(long, env = "IMPUTE_USER_ID")]
        user: String,
        /// Seconds between status checks
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,
        /// Where to save the result once the job completes
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show the imputation service's status for a job
    Status { job_id: String },
    /// List a user's jobs
    List {
        #[arg(long, env = "IMPUTE_USER_ID")]
        user: String,
        /// Show stored statuses without asking the imputation service
        #[arg(long)]
        no_refresh: bool,
    },
    /// Download a completed job's result
    Download {
        job_id: String,
        #[arg(long)]
        output: PathBuf,
    },
    /// Delete a job on the imputation service and its tracking record
    Delete {
        job_id: String,
        /// Tracking record ID to remove as well
        #[arg(long)]
        record: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("impute_portal=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let imputation =
        ImputationClient::new(&args.service_url, Duration::from_secs(args.timeout_secs))?;
    let backend = FilesApiClient::new(&args.api_url)?;

    match args.command {
        Command::Upload {
            file,
            user,
            poll_interval,
            output,
        } => {
            let flow = UploadFlow::new(imputation, backend, &user)
                .with_poll_interval(Duration::from_secs(poll_interval));

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let mut phases = flow.subscribe();
            let reporter = tokio::spawn(async move {
                while phases.changed().await.is_ok() {
                    let phase = phases.borrow_and_update().clone();
                    eprintln!("{}", phase);
                }
            });

            let phase = flow.run(&file, &cancel).await?;

            match (&phase, output) {
                (UploadPhase::Completed { job_id }, Some(dest)) => {
                    let bytes = flow.download(job_id, &dest).await?;
                    println!("Saved {} bytes to {}", bytes, dest.display());
                }
                (UploadPhase::Completed { job_id }, None) => println!("{}", job_id),
                (UploadPhase::Polling { job_id }, _) => {
                    println!("Stopped waiting; job {} is still processing", job_id)
                }
                (
                    UploadPhase::Registered { job_id, status, .. }
                    | UploadPhase::Stopped { job_id, status },
                    _,
                ) => println!("Job {} is {}; check again with `impute status`", job_id, status),
                (other, _) => anyhow::bail!("Upload did not complete: {}", other),
            }

            drop(flow);
            let _ = reporter.await;
        }
        Command::Status { job_id } => {
            let status = imputation.job_status(&job_id).await?;
            println!("{}", status);
        }
        Command::List { user, no_refresh } => {
            for job in backend.list(&user, !no_refresh).await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    job.id, job.external_job_id, job.status, job.created_at
                );
            }
        }
        Command::Download { job_id, output } => {
            let bytes = imputation.download_to(&job_id, &output).await?;
            println!("Saved {} bytes to {}", bytes, output.display());
        }
        Command::Delete { job_id, record } => {
            let flow = UploadFlow::new(imputation, backend, "");
            flow.discard(&job_id, record.as_deref()).await?;
            println!("Deleted {}", job_id);
        }
    }

    Ok(())
}
