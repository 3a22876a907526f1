//! Handle for talking to a running job manager.

use std::time::Duration;

use queue_core::{Job, JobEntry, ListEvent, ManagerConfig};
use ractor::{Actor, ActorRef, RpcReplyPort};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::manager_actor::{ManagerActor, ManagerArgs};
use crate::messages::{EngineStats, ManagerError, ManagerMessage, request};
use crate::observer::ListObserver;

/// Cloneable handle to a manager actor and its engine.
///
/// Every method is a message to the actor, so calls made from one task are
/// applied in the order they were made.
#[derive(Clone)]
pub struct JobManager {
    actor: ActorRef<ManagerMessage>,
    event_tx: broadcast::Sender<ListEvent>,
    rpc_timeout: Duration,
}

impl JobManager {
    /// Start a manager (and its engine) with no observers besides the event channel.
    pub async fn start(config: ManagerConfig) -> Result<(Self, JoinHandle<()>), ManagerError> {
        Self::start_with_observers(config, Vec::new()).await
    }

    /// Start a manager whose list changes are also delivered to `observers`.
    pub async fn start_with_observers(
        config: ManagerConfig,
        observers: Vec<Box<dyn ListObserver>>,
    ) -> Result<(Self, JoinHandle<()>), ManagerError> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let rpc_timeout = config.rpc_timeout();
        let args = ManagerArgs {
            config,
            observers,
            event_tx: event_tx.clone(),
        };

        let (actor, handle) = Actor::spawn(None, ManagerActor, args)
            .await
            .map_err(|e| ManagerError::Actor(format!("Failed to spawn manager: {}", e)))?;

        Ok((
            Self {
                actor,
                event_tx,
                rpc_timeout,
            },
            handle,
        ))
    }

    /// Subscribe to list events.
    pub fn subscribe(&self) -> broadcast::Receiver<ListEvent> {
        self.event_tx.subscribe()
    }

    async fn call<T: Send + 'static>(
        &self,
        build: impl FnOnce(RpcReplyPort<T>) -> ManagerMessage,
    ) -> Result<T, ManagerError> {
        request(&self.actor, self.rpc_timeout, build).await
    }

    fn tell(&self, message: ManagerMessage) -> Result<(), ManagerError> {
        self.actor
            .send_message(message)
            .map_err(|e| ManagerError::Actor(e.to_string()))
    }

    /// Submit a job and show it in the list.
    pub async fn add(&self, job: Job) -> Result<(), ManagerError> {
        self.call(|reply| ManagerMessage::Add { job, reply }).await?
    }

    /// Reconcile the list against the engine.
    pub async fn reload(&self) -> Result<(), ManagerError> {
        self.call(|reply| ManagerMessage::Reload { reply: Some(reply) })
            .await?
    }

    /// Remove a clearable job. Returns the index it had.
    pub async fn clear(&self, job: &Job) -> Result<usize, ManagerError> {
        let job_id = job.id();
        self.call(|reply| ManagerMessage::Clear { job_id, reply })
            .await?
    }

    /// Remove every clearable job. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<usize, ManagerError> {
        self.call(|reply| ManagerMessage::ClearAll { reply }).await
    }

    /// Replace a cancelled job with a retry copy in the same slot.
    pub async fn retry(&self, job: &Job) -> Result<Job, ManagerError> {
        let job_id = job.id();
        self.call(|reply| ManagerMessage::Retry { job_id, reply })
            .await?
    }

    /// Cancel and retry every queued job that has not started. Jobs whose work
    /// cannot be retried are left in place. Returns how many were requeued.
    pub async fn requeue(&self) -> Result<usize, ManagerError> {
        self.call(|reply| ManagerMessage::Requeue { reply }).await?
    }

    /// Move the job at `from` to `to`, then requeue so execution follows the list order.
    pub async fn reorder(&self, from: usize, to: usize) -> Result<usize, ManagerError> {
        self.call(|reply| ManagerMessage::Reorder { from, to, reply })
            .await?
    }

    /// Ask every tracked job to stop.
    pub fn cancel_all(&self) -> Result<(), ManagerError> {
        self.tell(ManagerMessage::CancelAll)
    }

    pub fn pause(&self) -> Result<(), ManagerError> {
        self.tell(ManagerMessage::Pause)
    }

    pub fn resume(&self) -> Result<(), ManagerError> {
        self.tell(ManagerMessage::Resume)
    }

    pub async fn is_paused(&self) -> Result<bool, ManagerError> {
        self.call(|reply| ManagerMessage::IsPaused { reply }).await
    }

    /// Change the concurrency limit. Lowering it below the number of running
    /// jobs stops nothing; new launches wait until running drops below `max`.
    pub async fn set_max_concurrency(&self, max: usize) -> Result<(), ManagerError> {
        self.call(|reply| ManagerMessage::SetMaxConcurrency { max, reply })
            .await?
    }

    pub async fn engine_stats(&self) -> Result<EngineStats, ManagerError> {
        self.call(|reply| ManagerMessage::EngineStats { reply })
            .await?
    }

    /// Entry at `index`, if any.
    pub async fn get(&self, index: usize) -> Result<Option<JobEntry>, ManagerError> {
        self.call(|reply| ManagerMessage::Get { index, reply }).await
    }

    /// Number of listed jobs.
    pub async fn count(&self) -> Result<usize, ManagerError> {
        self.call(|reply| ManagerMessage::Count { reply }).await
    }

    /// Every listed job, in order.
    pub async fn entries(&self) -> Result<Vec<JobEntry>, ManagerError> {
        self.call(|reply| ManagerMessage::Entries { reply }).await
    }

    /// Stop the manager and its engine.
    pub fn shutdown(&self) -> Result<(), ManagerError> {
        self.tell(ManagerMessage::Shutdown)
    }
}
