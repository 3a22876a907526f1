//! Manager actor: owns the ordered job list and reconciles it with the engine.

use std::sync::Arc;
use std::time::Duration;

use queue_core::{
    Job, JobEntry, JobId, JobObserver, JobSnapshot, ListEvent, ManagerConfig, Rejected,
    UserStatus,
};
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;

use crate::engine_actor::{EngineActor, EngineState};
use crate::messages::{EngineMessage, ManagerError, ManagerMessage, request};
use crate::observer::ListObserver;

/// Forwards job change notifications into one manager's mailbox.
struct ManagerNotifier {
    manager: ActorRef<ManagerMessage>,
}

impl JobObserver for ManagerNotifier {
    fn job_changed(&self, snapshot: &JobSnapshot) {
        let message = ManagerMessage::JobChanged {
            snapshot: snapshot.clone(),
        };
        if self.manager.send_message(message).is_err() {
            tracing::trace!("Manager gone, dropping change of job {}", snapshot.id);
        }
    }
}

async fn submit(
    engine: &ActorRef<EngineMessage>,
    timeout: Duration,
    job: Job,
) -> Result<Vec<JobEntry>, ManagerError> {
    let submitted = request(engine, timeout, |reply| EngineMessage::Submit { job, reply }).await?;
    Ok(submitted?)
}

/// Arguments for the manager actor.
pub struct ManagerArgs {
    pub config: ManagerConfig,
    pub observers: Vec<Box<dyn ListObserver>>,
    pub event_tx: broadcast::Sender<ListEvent>,
}

/// State for the manager actor.
pub struct ManagerState {
    /// The list consumers see.
    jobs: Vec<JobEntry>,
    paused: bool,
    engine: ActorRef<EngineMessage>,
    notifier: Arc<ManagerNotifier>,
    observers: Vec<Box<dyn ListObserver>>,
    event_tx: broadcast::Sender<ListEvent>,
    rpc_timeout: Duration,
    shutting_down: bool,
}

impl ManagerState {
    fn index_of(&self, job_id: JobId) -> Option<usize> {
        self.jobs.iter().position(|entry| entry.id() == job_id)
    }

    fn publish(&self, event: ListEvent) {
        tracing::trace!("{}", event.description());
        // No receivers is fine.
        let _ = self.event_tx.send(event);
    }

    fn did_insert(&mut self, index: usize) {
        let Some(entry) = self.jobs.get(index) else {
            return;
        };
        for observer in &mut self.observers {
            observer.did_insert(index, entry);
        }
        self.publish(ListEvent::inserted(index, entry.snapshot.clone()));
    }

    fn did_remove(&mut self, index: usize, entry: &JobEntry) {
        for observer in &mut self.observers {
            observer.did_remove(index, entry);
        }
        self.publish(ListEvent::removed(index, entry.snapshot.clone()));
    }

    fn did_update(&mut self, index: usize) {
        let Some(entry) = self.jobs.get(index) else {
            return;
        };
        for observer in &mut self.observers {
            observer.did_update(index, entry);
        }
        self.publish(ListEvent::updated(index, entry.snapshot.clone()));
    }

    fn did_replace(&mut self, index: usize, previous: &JobEntry) {
        let Some(entry) = self.jobs.get(index) else {
            return;
        };
        for observer in &mut self.observers {
            observer.did_replace(index, previous, entry);
        }
        self.publish(ListEvent::replaced(
            index,
            previous.snapshot.clone(),
            entry.snapshot.clone(),
        ));
    }

    async fn add(&mut self, job: Job) -> Result<(), ManagerError> {
        job.subscribe(self.notifier.clone());
        let submissions = submit(&self.engine, self.rpc_timeout, job).await?;
        self.reconcile(submissions);
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), ManagerError> {
        let submissions = request(&self.engine, self.rpc_timeout, |reply| {
            EngineMessage::Submissions { reply }
        })
        .await?;
        self.reconcile(submissions);
        Ok(())
    }

    /// Insert newly seen submissions and republish the known ones.
    fn reconcile(&mut self, submissions: Vec<JobEntry>) {
        for submission in submissions {
            match self.index_of(submission.id()) {
                Some(index) => {
                    self.jobs[index].refresh(submission.snapshot);
                    self.did_update(index);
                }
                None => {
                    let snapshot = &submission.snapshot;
                    if snapshot.can_clear() || snapshot.was_copied_for_retry {
                        continue;
                    }
                    submission.job.subscribe(self.notifier.clone());
                    self.jobs.push(submission);
                    self.did_insert(self.jobs.len() - 1);
                }
            }
        }
    }

    fn job_changed(&mut self, snapshot: JobSnapshot) {
        let Some(index) = self.index_of(snapshot.id) else {
            return;
        };
        if self.jobs[index].refresh(snapshot) {
            self.did_update(index);
        }
    }

    fn clear(&mut self, job_id: JobId) -> Result<usize, Rejected> {
        let index = self.index_of(job_id).ok_or(Rejected::NotListed(job_id))?;
        let snapshot = &self.jobs[index].snapshot;
        if !snapshot.can_clear() {
            return Err(Rejected::NotClearable {
                status: snapshot.user_status(),
            });
        }
        let entry = self.jobs.remove(index);
        self.did_remove(index, &entry);
        Ok(index)
    }

    fn clear_all(&mut self) -> usize {
        let mut removed = 0;
        let mut index = 0;
        while index < self.jobs.len() {
            if self.jobs[index].snapshot.can_clear() {
                let entry = self.jobs.remove(index);
                self.did_remove(index, &entry);
                removed += 1;
            } else {
                index += 1;
            }
        }
        removed
    }

    async fn retry(&mut self, job_id: JobId) -> Result<Job, ManagerError> {
        let index = self.index_of(job_id).ok_or(Rejected::NotListed(job_id))?;
        let copy = self.jobs[index].job.copy_for_retry()?;
        copy.subscribe(self.notifier.clone());

        // The slot only changes once the engine holds the copy.
        let submissions = submit(&self.engine, self.rpc_timeout, copy.clone())
            .await
            .inspect_err(|e| tracing::warn!("Retry copy of job {} not submitted: {}", job_id, e))?;
        let entry = submissions
            .into_iter()
            .find(|entry| entry.id() == copy.id())
            .unwrap_or_else(|| JobEntry::capture(copy.clone()));

        let previous = std::mem::replace(&mut self.jobs[index], entry);
        self.did_replace(index, &previous);
        tracing::debug!("Job '{}' retried as {}", copy.name(), copy.id());
        Ok(copy)
    }

    async fn requeue(&mut self) -> usize {
        let candidates: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry.user_status() == UserStatus::Queued && !entry.snapshot.has_started
            })
            .map(|entry| entry.job.clone())
            .collect();

        let mut requeued = 0;
        for job in candidates {
            if !job.supports_retry() {
                tracing::debug!("Not requeueing job {}: {}", job.id(), Rejected::RetryUnsupported);
                continue;
            }
            // The engine may have launched it since the last notification.
            if let Err(rejected) = job.cancel_unstarted() {
                tracing::debug!("Not requeueing job {}: {}", job.id(), rejected);
                continue;
            }
            match self.retry(job.id()).await {
                Ok(_) => requeued += 1,
                Err(e) => tracing::warn!("Requeue of job {} failed: {}", job.id(), e),
            }
        }
        requeued
    }

    async fn reorder(&mut self, from: usize, to: usize) -> Result<usize, ManagerError> {
        let len = self.jobs.len();
        for index in [from, to] {
            if index >= len {
                return Err(ManagerError::IndexOutOfBounds { index, len });
            }
        }
        if from != to {
            let entry = self.jobs.remove(from);
            self.did_remove(from, &entry);
            self.jobs.insert(to, entry);
            self.did_insert(to);
        }
        Ok(self.requeue().await)
    }

    /// Stop the engine and wait for it, so tracked jobs are cancelled first.
    async fn stop_engine(&mut self) {
        self.shutting_down = true;
        if let Err(e) = self.engine.stop_and_wait(None, Some(self.rpc_timeout)).await {
            tracing::debug!("Engine already stopped: {}", e);
        }
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), ManagerError> {
        self.paused = paused;
        let message = if paused {
            EngineMessage::Pause
        } else {
            EngineMessage::Resume
        };
        self.engine
            .send_message(message)
            .map_err(|e| ManagerError::Actor(e.to_string()))
    }
}

/// Manager actor that owns the job list.
pub struct ManagerActor;

impl Actor for ManagerActor {
    type Msg = ManagerMessage;
    type State = ManagerState;
    type Arguments = ManagerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting job manager");
        args.config
            .validate()
            .map_err(|e| ActorProcessingErr::from(format!("Invalid manager config: {}", e)))?;

        let engine_state = EngineState::new(args.config.engine.clone()).with_manager(myself.clone());
        let (engine, _handle) =
            Actor::spawn_linked(None, EngineActor, engine_state, myself.get_cell())
                .await
                .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn engine: {}", e)))?;

        Ok(ManagerState {
            jobs: Vec::new(),
            paused: false,
            engine,
            notifier: Arc::new(ManagerNotifier { manager: myself }),
            observers: args.observers,
            event_tx: args.event_tx,
            rpc_timeout: args.config.rpc_timeout(),
            shutting_down: false,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if !state.shutting_down {
            state.stop_engine().await;
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ManagerMessage::Add { job, reply } => {
                let _ = reply.send(state.add(job).await);
            }

            ManagerMessage::Reload { reply } => {
                let result = state.reload().await;
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            tracing::warn!("Reload failed: {}", e);
                        }
                    }
                }
            }

            ManagerMessage::JobChanged { snapshot } => {
                state.job_changed(snapshot);
            }

            ManagerMessage::Clear { job_id, reply } => {
                let result = state.clear(job_id).map_err(ManagerError::from);
                if let Err(ref e) = result {
                    tracing::debug!("Clear of job {} rejected: {}", job_id, e);
                }
                let _ = reply.send(result);
            }

            ManagerMessage::ClearAll { reply } => {
                let _ = reply.send(state.clear_all());
            }

            ManagerMessage::Retry { job_id, reply } => {
                let result = state.retry(job_id).await;
                if let Err(ref e) = result {
                    tracing::debug!("Retry of job {} rejected: {}", job_id, e);
                }
                let _ = reply.send(result);
            }

            ManagerMessage::Requeue { reply } => {
                let _ = reply.send(Ok(state.requeue().await));
            }

            ManagerMessage::Reorder { from, to, reply } => {
                let _ = reply.send(state.reorder(from, to).await);
            }

            ManagerMessage::CancelAll => {
                state.engine.send_message(EngineMessage::CancelAll)?;
            }

            ManagerMessage::Pause => {
                state.set_paused(true)?;
            }

            ManagerMessage::Resume => {
                state.set_paused(false)?;
            }

            ManagerMessage::IsPaused { reply } => {
                let _ = reply.send(state.paused);
            }

            ManagerMessage::SetMaxConcurrency { max, reply } => {
                let result = request(&state.engine, state.rpc_timeout, |reply| {
                    EngineMessage::SetMaxConcurrency { max, reply }
                })
                .await
                .and_then(|applied| applied.map_err(ManagerError::from));
                let _ = reply.send(result);
            }

            ManagerMessage::EngineStats { reply } => {
                let result = request(&state.engine, state.rpc_timeout, |reply| {
                    EngineMessage::GetStats { reply }
                })
                .await;
                let _ = reply.send(result);
            }

            ManagerMessage::Get { index, reply } => {
                let _ = reply.send(state.jobs.get(index).cloned());
            }

            ManagerMessage::Count { reply } => {
                let _ = reply.send(state.jobs.len());
            }

            ManagerMessage::Entries { reply } => {
                let _ = reply.send(state.jobs.clone());
            }

            ManagerMessage::Shutdown => {
                tracing::info!("Shutting down job manager");
                state.stop_engine().await;
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, _) if state.shutting_down => {
                tracing::debug!("Engine {} stopped", cell.get_id());
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::warn!("Engine {} terminated: {:?}", cell.get_id(), reason);
                myself.stop(Some("engine terminated".to_string()));
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                tracing::warn!("Engine {} failed: {}", cell.get_id(), err);
                myself.stop(Some("engine failed".to_string()));
            }
            _ => {}
        }
        Ok(())
    }
}
