#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use queue_core::{Job, JobObserver, JobSnapshot, Work, WorkFuture};
use tokio::sync::Semaphore;

/// Work that advances one step per permit added to its gate, up to `target`.
pub struct StepWork {
    gate: Arc<Semaphore>,
    target: u32,
}

impl StepWork {
    pub fn new(target: u32) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: gate.clone(),
                target,
            },
            gate,
        )
    }
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

/// Work that cannot be retried.
pub struct OneShotWork;

impl Work for OneShotWork {
    fn kind(&self) -> &str {
        "one-shot"
    }

    fn run(&self, _job: Job) -> WorkFuture {
        Box::pin(async {})
    }

    fn respawn(&self) -> Option<Arc<dyn Work>> {
        None
    }
}

/// Records every snapshot a job publishes.
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<JobSnapshot>>,
}

impl Recorder {
    pub fn seen(&self) -> Vec<JobSnapshot> {
        self.seen.lock().unwrap().clone()
    }
}

impl JobObserver for Recorder {
    fn job_changed(&self, snapshot: &JobSnapshot) {
        self.seen.lock().unwrap().push(snapshot.clone());
    }
}

pub fn step_job(name: &str, target: u32) -> (Job, Arc<Semaphore>) {
    let (work, gate) = StepWork::new(target);
    (Job::with_work(name, work), gate)
}
