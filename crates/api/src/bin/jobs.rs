//! Batch job runner, meant to be called from cron.
//!
//! ```text
//! jobs <job> [--limit N] [--month YYYY-MM]
//! ```
//!
//! Jobs: `abandoned-carts`, `review-requests`, `sla-breaches`,
//! `vendor-invoices` (`--month` defaults to the previous month) and
//! `retry-dispatch`.

use std::process::ExitCode;
use std::sync::Arc;

use api::config::{Config, ConfigError};
use api::telemetry;
use chrono::Utc;
use fulfillment::{CarrierClient, Dispatcher, ShiprocketClient};
use notifications::{InvoiceMonth, Job, JobError, JobRunner, Notifier, ResendMailer};
use store::PostgresStore;

#[derive(Debug, PartialEq)]
struct Invocation {
    job: Job,
    limit: Option<usize>,
}

fn usage() -> String {
    format!(
        "usage: jobs <job> [--limit N] [--month YYYY-MM]\n  jobs: {}",
        Job::NAMES.join(", ")
    )
}

fn parse_args(args: &[String]) -> Result<Invocation, JobError> {
    let mut args = args.iter();
    let mut job: Job = args
        .next()
        .ok_or_else(|| JobError::InvalidArgument("no job given".to_string()))?
        .parse()?;
    let mut limit = None;

    while let Some(flag) = args.next() {
        let value = args
            .next()
            .ok_or_else(|| JobError::InvalidArgument(format!("{flag} needs a value")))?;
        match flag.as_str() {
            "--limit" => {
                let n: usize = value.parse().map_err(|_| {
                    JobError::InvalidArgument(format!("--limit must be a positive number, got {value:?}"))
                })?;
                if n == 0 {
                    return Err(JobError::InvalidArgument("--limit must be at least 1".to_string()));
                }
                limit = Some(n);
            }
            "--month" => match job {
                Job::VendorInvoices(_) => job = Job::VendorInvoices(Some(value.parse::<InvoiceMonth>()?)),
                _ => {
                    return Err(JobError::InvalidArgument(format!(
                        "--month only applies to vendor-invoices, not {}",
                        job.name()
                    )));
                }
            },
            other => return Err(JobError::InvalidArgument(format!("unknown flag {other:?}"))),
        }
    }

    Ok(Invocation { job, limit })
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{e}\n{}", usage());
            return ExitCode::from(2);
        }
    };

    let config = match Config::from_env().and_then(|config| {
        if config.database_url.is_some() {
            Ok(config)
        } else {
            Err(ConfigError::Missing("DATABASE_URL"))
        }
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };
    telemetry::init_tracing(&config);

    let store = match connect(&config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "cannot open the database");
            return ExitCode::FAILURE;
        }
    };

    let carrier: Arc<dyn CarrierClient> = Arc::new(ShiprocketClient::new(
        &config.shiprocket_base_url,
        &config.shiprocket_api_token,
    ));
    let mailer = ResendMailer::new(
        &config.resend_base_url,
        &config.resend_api_key,
        &config.mail_from,
    );
    let runner = JobRunner::new(
        store.clone(),
        Notifier::new(Arc::new(mailer), config.ops_alert_email.clone()),
        Dispatcher::new(store, carrier, config.dispatch_config()),
        config.job_config(),
    );

    match runner.run(invocation.job, Utc::now(), invocation.limit).await {
        Ok(summary) => {
            println!("{summary}");
            if summary.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "job aborted");
            eprintln!("job failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn connect(config: &Config) -> store::Result<PostgresStore> {
    let url = config.database_url.as_deref().unwrap_or_default();
    let store = PostgresStore::connect(url).await?;
    store.run_migrations().await?;
    Ok(store)
}
