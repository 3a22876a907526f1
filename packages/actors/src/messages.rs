//! Message types for actor communication.

use std::time::Duration;

use queue_core::{ConfigError, Job, JobEntry, JobId, JobSnapshot, Rejected};
use ractor::rpc::CallResult;
use ractor::{ActorRef, Message, RpcReplyPort};

/// Point-in-time counters of the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Jobs in the submission set, including finished ones not yet evicted.
    pub submitted: usize,
    /// Jobs waiting for a slot.
    pub pending: usize,
    /// Jobs currently executing.
    pub running: usize,
    pub max_concurrency: usize,
    pub paused: bool,
}

/// Messages for the EngineActor.
#[derive(Debug)]
pub enum EngineMessage {
    /// Submit a Ready job. Replies with the submission set as it stood
    /// right after the job was added.
    Submit {
        job: Job,
        reply: RpcReplyPort<Result<Vec<JobEntry>, Rejected>>,
    },

    /// Snapshot of the submission set.
    Submissions { reply: RpcReplyPort<Vec<JobEntry>> },

    /// Request cancellation of every tracked job.
    CancelAll,

    /// Change the concurrency limit. Jobs already running are not stopped.
    SetMaxConcurrency {
        max: usize,
        reply: RpcReplyPort<Result<(), ConfigError>>,
    },

    /// Stop launching new jobs.
    Pause,

    /// Resume launching jobs.
    Resume,

    /// Get engine stats.
    GetStats { reply: RpcReplyPort<EngineStats> },

    /// A launched job's work has returned.
    JobFinished { job_id: JobId },

    /// Drop a finished job from the submission set.
    Evict { job_id: JobId },
}

/// Messages for the ManagerActor.
#[derive(Debug)]
pub enum ManagerMessage {
    /// Submit a job and reconcile the list.
    Add {
        job: Job,
        reply: RpcReplyPort<Result<(), ManagerError>>,
    },

    /// Reconcile the list against the engine's submission set.
    Reload {
        reply: Option<RpcReplyPort<Result<(), ManagerError>>>,
    },

    /// A subscribed job changed.
    JobChanged { snapshot: JobSnapshot },

    /// Remove a clearable job from the list. Replies with its former index.
    Clear {
        job_id: JobId,
        reply: RpcReplyPort<Result<usize, ManagerError>>,
    },

    /// Remove every clearable job. Replies with how many were removed.
    ClearAll { reply: RpcReplyPort<usize> },

    /// Replace a cancelled job with its retry copy.
    Retry {
        job_id: JobId,
        reply: RpcReplyPort<Result<Job, ManagerError>>,
    },

    /// Cancel and retry every queued job that has not started.
    Requeue {
        reply: RpcReplyPort<Result<usize, ManagerError>>,
    },

    /// Move a job to a new position, then requeue.
    Reorder {
        from: usize,
        to: usize,
        reply: RpcReplyPort<Result<usize, ManagerError>>,
    },

    /// Cancel everything the engine tracks.
    CancelAll,

    /// Pause launching of new jobs.
    Pause,

    /// Resume launching of new jobs.
    Resume,

    /// Whether the manager is paused.
    IsPaused { reply: RpcReplyPort<bool> },

    /// Change the engine's concurrency limit.
    SetMaxConcurrency {
        max: usize,
        reply: RpcReplyPort<Result<(), ManagerError>>,
    },

    /// Get the engine's stats.
    EngineStats {
        reply: RpcReplyPort<Result<EngineStats, ManagerError>>,
    },

    /// Entry at a list position.
    Get {
        index: usize,
        reply: RpcReplyPort<Option<JobEntry>>,
    },

    /// Number of listed jobs.
    Count { reply: RpcReplyPort<usize> },

    /// The whole list.
    Entries { reply: RpcReplyPort<Vec<JobEntry>> },

    /// Shutdown the manager and its engine.
    Shutdown,
}

/// Error type for manager operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("rejected: {0}")]
    Rejected(#[from] Rejected),

    #[error("index {index} out of bounds for list of {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Timeout")]
    Timeout,
}

impl ManagerError {
    /// The policy rejection behind this error, if that is what it is.
    pub fn rejection(&self) -> Option<&Rejected> {
        match self {
            ManagerError::Rejected(rejected) => Some(rejected),
            _ => None,
        }
    }
}

/// Request/reply call into an actor with a timeout.
pub(crate) async fn request<M, T>(
    actor: &ActorRef<M>,
    timeout: Duration,
    build: impl FnOnce(RpcReplyPort<T>) -> M,
) -> Result<T, ManagerError>
where
    M: Message,
    T: Send + 'static,
{
    match ractor::rpc::call(actor, build, Some(timeout)).await {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(ManagerError::Timeout),
        Ok(CallResult::SenderError) => Err(ManagerError::Actor("reply port dropped".into())),
        Err(e) => Err(ManagerError::Actor(e.to_string())),
    }
}
