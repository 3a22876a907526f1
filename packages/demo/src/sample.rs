//! A demo work unit that sleeps a random slice and counts to a target.

use std::sync::Arc;
use std::time::Duration;

use queue_core::{Job, Work, WorkFuture};
use rand::Rng;

/// Counts progress up to `target`, sleeping up to `max_delay` per step.
#[derive(Debug, Clone)]
pub struct SampleWork {
    target: u32,
    max_delay: Duration,
}

impl Default for SampleWork {
    fn default() -> Self {
        Self {
            target: 100,
            max_delay: Duration::from_secs(1),
        }
    }
}

impl SampleWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: u32) -> Self {
        self.target = target;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }
}

/// Between 1/50th and all of `max`.
fn step_delay(max: Duration) -> Duration {
    let divisor = rand::thread_rng().gen_range(1..=50u32);
    max / divisor
}

impl Work for SampleWork {
    fn kind(&self) -> &str {
        "sample"
    }

    fn run(&self, job: Job) -> WorkFuture {
        let target = self.target;
        let max_delay = self.max_delay;
        Box::pin(async move {
            while job.progress() < target {
                if job.is_cancelled() {
                    return;
                }
                let delay = step_delay(max_delay);
                tokio::select! {
                    _ = job.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                job.advance(1);
            }
        })
    }

    fn respawn(&self) -> Option<Arc<dyn Work>> {
        Some(Arc::new(self.clone()))
    }
}
