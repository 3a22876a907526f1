//! Execution engine actor: bounded-concurrency FIFO runner for submitted jobs.

use std::collections::{HashSet, VecDeque};

use queue_core::{EngineConfig, ExecutionState, Job, JobEntry, JobId, Launch, Rejected};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::{EngineMessage, EngineStats, ManagerMessage};

/// State for the engine actor.
pub struct EngineState {
    config: EngineConfig,
    /// Every tracked job, in submission order.
    submitted: Vec<Job>,
    /// Jobs waiting for a slot (FIFO).
    pending: VecDeque<Job>,
    /// Jobs whose work is currently running.
    running: HashSet<JobId>,
    paused: bool,
    /// Notified whenever the submission set changes.
    manager: Option<ActorRef<ManagerMessage>>,
}

impl EngineState {
    /// Create a new engine state.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            submitted: Vec::new(),
            pending: VecDeque::new(),
            running: HashSet::new(),
            paused: false,
            manager: None,
        }
    }

    /// Set the manager to notify about submission set changes.
    pub fn with_manager(mut self, manager: ActorRef<ManagerMessage>) -> Self {
        self.manager = Some(manager);
        self
    }

    fn entries(&self) -> Vec<JobEntry> {
        self.submitted.iter().cloned().map(JobEntry::capture).collect()
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            submitted: self.submitted.len(),
            pending: self.pending.len(),
            running: self.running.len(),
            max_concurrency: self.config.max_concurrency,
            paused: self.paused,
        }
    }

    fn submission_set_changed(&self) {
        if let Some(ref manager) = self.manager
            && let Err(e) = manager.send_message(ManagerMessage::Reload { reply: None })
        {
            tracing::warn!("Failed to notify manager of submission change: {}", e);
        }
    }

    fn submit(&mut self, job: Job) -> Result<(), Rejected> {
        if self.submitted.contains(&job) {
            return Err(Rejected::AlreadySubmitted(job.id()));
        }
        let state = job.execution_state();
        if state != ExecutionState::Ready {
            return Err(Rejected::NotReady { state });
        }

        tracing::debug!("Job {} submitted", job.id());
        self.submitted.push(job.clone());
        self.pending.push_back(job);
        Ok(())
    }

    /// Launch whatever can be launched.
    ///
    /// Cancelled jobs are launched regardless of capacity; launching them
    /// only finishes them.
    fn pump(&mut self, myself: &ActorRef<EngineMessage>) {
        let mut cancelled = Vec::new();
        self.pending.retain(|job| {
            if job.is_cancelled() {
                cancelled.push(job.clone());
                false
            } else {
                true
            }
        });
        for job in cancelled {
            self.launch(job, myself);
        }

        while !self.paused && self.running.len() < self.config.max_concurrency {
            let Some(job) = self.pending.pop_front() else {
                break;
            };
            self.launch(job, myself);
        }
    }

    fn launch(&mut self, job: Job, myself: &ActorRef<EngineMessage>) {
        let job_id = job.id();
        match job.begin() {
            Ok(Launch::Run) => {
                tracing::debug!("Launching job {} ({})", job_id, job.kind());
                self.running.insert(job_id);

                let engine = myself.clone();
                tokio::spawn(async move {
                    // Run the work in its own task so a panic still releases the slot.
                    if let Err(e) = tokio::spawn(job.execute()).await {
                        tracing::warn!("Job {} work aborted: {}", job_id, e);
                        job.finish();
                    }
                    if engine
                        .send_message(EngineMessage::JobFinished { job_id })
                        .is_err()
                    {
                        tracing::debug!("Engine gone before job {} finished", job_id);
                    }
                });
            }
            Ok(Launch::Skipped) => {
                tracing::debug!("Job {} cancelled before launch", job_id);
                self.retire(job_id, myself);
            }
            Err(rejected) => {
                tracing::warn!("Not launching job {}: {}", job_id, rejected);
                self.retire(job_id, myself);
            }
        }
    }

    /// Schedule eviction of a job that will not run (again).
    fn retire(&mut self, job_id: JobId, myself: &ActorRef<EngineMessage>) {
        let retention = self.config.finished_retention();
        if retention.is_zero() {
            self.evict(job_id);
            return;
        }

        let engine = myself.clone();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            let _ = engine.send_message(EngineMessage::Evict { job_id });
        });
    }

    fn evict(&mut self, job_id: JobId) {
        let before = self.submitted.len();
        self.submitted.retain(|job| job.id() != job_id);
        if self.submitted.len() != before {
            tracing::debug!("Job {} evicted from engine", job_id);
            self.submission_set_changed();
        }
    }

    fn cancel_all(&self) {
        for job in &self.submitted {
            if let Err(rejected) = job.cancel() {
                tracing::trace!("Skipping cancel of job {}: {}", job.id(), rejected);
            }
        }
    }
}

/// Engine actor that schedules and runs jobs.
pub struct EngineActor;

impl Actor for EngineActor {
    type Msg = EngineMessage;
    type State = EngineState;
    type Arguments = EngineState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        args.config
            .validate()
            .map_err(|e| ActorProcessingErr::from(format!("Invalid engine config: {}", e)))?;
        tracing::info!(
            "Starting execution engine (max concurrency {})",
            args.config.max_concurrency
        );
        Ok(args)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Stopping execution engine, cancelling {} tracked jobs",
            state.submitted.len()
        );
        // Running work winds down on its own once it sees the flag.
        state.cancel_all();
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            EngineMessage::Submit { job, reply } => match state.submit(job) {
                Ok(()) => {
                    let entries = state.entries();
                    state.pump(&myself);
                    let _ = reply.send(Ok(entries));
                    state.submission_set_changed();
                }
                Err(rejected) => {
                    tracing::debug!("Submit rejected: {}", rejected);
                    let _ = reply.send(Err(rejected));
                }
            },

            EngineMessage::Submissions { reply } => {
                let _ = reply.send(state.entries());
            }

            EngineMessage::CancelAll => {
                tracing::info!("Cancelling {} tracked jobs", state.submitted.len());
                state.cancel_all();
                state.pump(&myself);
            }

            EngineMessage::SetMaxConcurrency { max, reply } => {
                let config = state.config.clone().with_max_concurrency(max);
                match config.validate() {
                    Ok(()) => {
                        state.config = config;
                        state.pump(&myself);
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            EngineMessage::Pause => {
                state.paused = true;
            }

            EngineMessage::Resume => {
                state.paused = false;
                state.pump(&myself);
            }

            EngineMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            EngineMessage::JobFinished { job_id } => {
                if state.running.remove(&job_id) {
                    tracing::debug!("Job {} finished", job_id);
                }
                state.retire(job_id, &myself);
                state.pump(&myself);
            }

            EngineMessage::Evict { job_id } => {
                state.evict(job_id);
            }
        }

        Ok(())
    }
}
