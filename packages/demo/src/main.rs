//! Headless driver for the job queue manager.
//!
//! Adds a batch of sample jobs, cancels and retries one, moves another to
//! the front, waits for everything to finish and clears the list.
//!
//! Environment:
//! - `DEMO_JOBS` - number of jobs to add (default 5)
//! - `JOBQUEUE_MAX_CONCURRENCY`, `JOBQUEUE_RETENTION_MS`, `JOBQUEUE_RPC_TIMEOUT_MS`
//! - `RUST_LOG` - log filter (default `info`)

use std::error::Error;
use std::time::Duration;

use actors::{JobManager, TracingObserver};
use demo::SampleWork;
use queue_core::{Job, ListEvent, ManagerConfig, UserStatus};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const DEFAULT_JOBS: usize = 5;

fn demo_job_count() -> Result<usize, Box<dyn Error>> {
    match std::env::var("DEMO_JOBS") {
        Ok(value) => Ok(value.trim().parse()?),
        Err(_) => Ok(DEFAULT_JOBS),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ManagerConfig::from_env()?;
    let job_count = demo_job_count()?;
    tracing::info!(
        "Running {} jobs, {} at a time",
        job_count,
        config.engine.max_concurrency
    );

    let (manager, handle) =
        JobManager::start_with_observers(config, vec![Box::new(TracingObserver)]).await?;
    let mut events = manager.subscribe();

    for n in 1..=job_count {
        manager
            .add(Job::with_work(format!("Job {}", n), SampleWork::new()))
            .await?;
    }

    tokio::time::sleep(Duration::from_secs(2)).await;

    // Row actions: cancel the first job, then retry it in place.
    if let Some(first) = manager.get(0).await? {
        if first.job.cancel().is_ok() {
            tracing::info!("Cancelled '{}' at {}%", first.name(), first.job.progress());
            // Let the cancellation land before retrying.
            tokio::time::sleep(Duration::from_millis(200)).await;
            match manager.retry(&first.job).await {
                Ok(copy) => tracing::info!("Retrying '{}' from {}%", copy.name(), copy.progress()),
                Err(e) => tracing::warn!("Retry failed: {}", e),
            }
        }
    }

    // Move the last job to the front so it runs next.
    let count = manager.count().await?;
    if count > 1 {
        let requeued = manager.reorder(count - 1, 0).await?;
        tracing::info!("Reordered list, {} jobs requeued", requeued);
    }

    loop {
        match events.recv().await {
            Ok(event) => {
                tracing::debug!("{}", serde_json::to_string(&event)?);
                let finished = matches!(
                    &event,
                    ListEvent::Updated { job, .. } if job.user_status() == UserStatus::Finished
                );
                if finished && all_done(&manager).await? {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {} events", skipped);
                if all_done(&manager).await? {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }

    let cleared = manager.clear_all().await?;
    tracing::info!("Cleared {} jobs", cleared);

    manager.shutdown()?;
    handle.await?;
    Ok(())
}

async fn all_done(manager: &JobManager) -> Result<bool, Box<dyn Error>> {
    let entries = manager.entries().await?;
    Ok(entries.iter().all(|entry| entry.snapshot.can_clear()))
}
