//! `jobsync-watch`: tail a tenant's background jobs.
//!
//! ```text
//! jobsync-watch                      # follow the first page of jobs
//! jobsync-watch <job-id>             # also deep-link one job
//! jobsync-watch cancel <job-id> [reason]
//! ```
//!
//! Connection settings come from `JOBSYNC_*` environment variables.

use std::time::Duration;

use anyhow::{Context, bail};

use jobsync_client::{ClientConfig, JobSync};
use jobsync_core::JobId;
use jobsync_events::StreamKey;

const STREAMS: &[StreamKey] = &[StreamKey::BackgroundJobs, StreamKey::Deployments];
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

enum Command {
    Watch { job: Option<JobId> },
    Cancel { job: JobId, reason: Option<String> },
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    match args.next().as_deref() {
        None => Ok(Command::Watch { job: None }),
        Some("cancel") => {
            let job = args.next().context("usage: jobsync-watch cancel <job-id> [reason]")?;
            let reason = args.collect::<Vec<_>>().join(" ");
            Ok(Command::Cancel {
                job: job.parse().context("invalid job id")?,
                reason: (!reason.is_empty()).then_some(reason),
            })
        }
        Some(flag) if flag.starts_with('-') => bail!("unknown option {flag}"),
        Some(job) => {
            if let Some(extra) = args.next() {
                bail!("unexpected argument {extra}");
            }
            Ok(Command::Watch {
                job: Some(job.parse().context("invalid job id")?),
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobsync_observability::init();

    let command = parse_args(std::env::args().skip(1))?;
    let config = ClientConfig::from_env().context("reading JOBSYNC_* configuration")?;
    let sync = JobSync::start(config, STREAMS).context("starting job sync")?;

    let result = match command {
        Command::Watch { job } => watch(&sync, job).await,
        Command::Cancel { job, reason } => cancel(&sync, job, reason.as_deref()).await,
    };
    sync.shutdown().await;
    result
}

async fn watch(sync: &JobSync, job: Option<JobId>) -> anyhow::Result<()> {
    let _mounted = sync.mount();
    if let Some(id) = job {
        sync.watch_job(id);
    }

    let mut rx = sync.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let view = rx.borrow_and_update().view();
                let rendered = serde_json::to_string(&view).context("encoding job list")?;
                tracing::info!(total = view.total, jobs = %rendered, "jobs updated");
            }
        }
    }
}

async fn cancel(sync: &JobSync, id: JobId, reason: Option<&str>) -> anyhow::Result<()> {
    sync.watch_job(id.clone());

    let mut rx = sync.subscribe();
    let known = async {
        while rx.borrow_and_update().get(&id).is_none() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    };
    tokio::time::timeout(LOOKUP_TIMEOUT, known)
        .await
        .with_context(|| format!("job {id} not found"))?;

    let accepted = sync
        .request_cancel(&id, reason)
        .await
        .with_context(|| format!("cancelling job {id}"))?;
    tracing::info!(
        job_id = %accepted.job_id,
        status = %accepted.status,
        requested_at = %accepted.requested_at,
        "cancellation requested; waiting for the job to stop"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Command> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_watch_and_cancel() {
        assert!(matches!(parse(&[]).unwrap(), Command::Watch { job: None }));
        assert!(matches!(
            parse(&["job-9"]).unwrap(),
            Command::Watch { job: Some(id) } if id == JobId::new("job-9")
        ));
        assert!(matches!(
            parse(&["cancel", "job-9", "wrong", "target"]).unwrap(),
            Command::Cancel { job, reason: Some(r) } if job == JobId::new("job-9") && r == "wrong target"
        ));
        assert!(matches!(
            parse(&["cancel", "job-9"]).unwrap(),
            Command::Cancel { reason: None, .. }
        ));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&["cancel"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["a", "b"]).is_err());
        assert!(parse(&["cancel", " "]).is_err());
    }
}
