#![allow(dead_code)]

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use actors::JobManager;
use queue_core::{Job, JobEntry, ListEvent, ManagerConfig, Work, WorkFuture};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;

pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

const WAIT: Duration = Duration::from_secs(3);

/// Work that advances one step per permit added to its gate, up to `target`.
pub struct StepWork {
    gate: Arc<Semaphore>,
    target: u32,
}

impl Work for StepWork {
    fn kind(&self) -> &str {
        "step"
    }

    fn run(&self, job: Job) -> WorkFuture {
        let gate = self.gate.clone();
        let target = self.target;
        Box::pin(async move {
            while job.progress() < target {
                tokio::select! {
                    _ = job.cancelled() => return,
                    permit = gate.acquire() => match permit {
                        Ok(permit) => {
                            permit.forget();
                            job.advance(1);
                        }
                        Err(_) => return,
                    },
                }
            }
        })
    }

    fn respawn(&self) -> Option<Arc<dyn Work>> {
        Some(Arc::new(StepWork {
            gate: self.gate.clone(),
            target: self.target,
        }))
    }
}

/// Work that runs until cancelled and cannot be retried.
pub struct OneShotWork;

impl Work for OneShotWork {
    fn kind(&self) -> &str {
        "one-shot"
    }

    fn run(&self, job: Job) -> WorkFuture {
        Box::pin(async move { job.cancelled().await })
    }

    fn respawn(&self) -> Option<Arc<dyn Work>> {
        None
    }
}

/// A job that only progresses when its gate gets permits.
pub struct Gated {
    pub job: Job,
    pub gate: Arc<Semaphore>,
    pub target: u32,
}

impl Gated {
    pub fn new(name: &str, target: u32) -> Self {
        let gate = Arc::new(Semaphore::new(0));
        let work = StepWork {
            gate: gate.clone(),
            target,
        };
        Self {
            job: Job::with_work(name, work),
            gate,
            target,
        }
    }

    /// Let the work run to its target.
    pub fn complete(&self) {
        self.gate.add_permits(self.target as usize);
    }
}

pub async fn start_manager(max_concurrency: usize) -> TestResult<(JobManager, JoinHandle<()>)> {
    let config = ManagerConfig::default().with_max_concurrency(max_concurrency);
    Ok(JobManager::start(config).await?)
}

/// Next event matching `pred`, skipping others.
pub async fn wait_for(
    events: &mut broadcast::Receiver<ListEvent>,
    mut pred: impl FnMut(&ListEvent) -> bool,
) -> TestResult<ListEvent> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv()).await??;
        if pred(&event) {
            return Ok(event);
        }
    }
}

/// Every event that arrives before the stream goes quiet for `quiet`.
pub async fn drain(
    events: &mut broadcast::Receiver<ListEvent>,
    quiet: Duration,
) -> Vec<ListEvent> {
    let mut drained = Vec::new();
    while let Ok(Ok(event)) = tokio::time::timeout(quiet, events.recv()).await {
        drained.push(event);
    }
    drained
}

/// Poll the manager's list until `pred` holds.
pub async fn wait_until(
    manager: &JobManager,
    pred: impl Fn(&[JobEntry]) -> bool,
) -> TestResult<Vec<JobEntry>> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let entries = manager.entries().await?;
        if pred(&entries) {
            return Ok(entries);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!("condition not met, list: {:?}", entries).into());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
