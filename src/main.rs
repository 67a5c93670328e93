use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use tracing::{Instrument, error, info_span};
use uuid::Uuid;

use due_reminders::config::{self, JobConfig};
use due_reminders::error::ConfigError;
use due_reminders::job::{self, JobOutcome};
use due_reminders::logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    let config = JobConfig::from_env();
    let log_dir = config.as_ref().ok().and_then(|c| c.log_dir.clone());
    let _guard = match logging::init(log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("File logging disabled: {e}");
            logging::init(None).ok().flatten()
        }
    };

    config::log_presence(|key| std::env::var(key).ok());

    match run(config).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Result<JobConfig, ConfigError>) -> anyhow::Result<JobOutcome> {
    let config = match config {
        Ok(config) => config,
        Err(e) => return Ok(JobOutcome::config_failed(&e)),
    };

    let run_id = Uuid::new_v4();
    let span = info_span!("job", %run_id, zone = %config.zone);

    // A panic inside the job surfaces as a JoinError instead of aborting.
    let job = async move { job::execute(&config, Utc::now()).await };
    let handle = tokio::spawn(job.instrument(span));
    handle.await.context("job task failed")
}
