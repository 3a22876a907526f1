//! Policy rejections.
//!
//! Invalid transitions are not failures of the system; they are returned as
//! values so callers can tell a no-op from a success.

use thiserror::Error;

use crate::job::{ExecutionState, JobId, UserStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("job cannot be cancelled while {status}")]
    NotCancellable { status: UserStatus },

    #[error("job cannot be retried while {status}")]
    NotRetryable { status: UserStatus },

    #[error("job was already copied for retry")]
    AlreadyCopied,

    #[error("job variant does not support retry")]
    RetryUnsupported,

    #[error("job cannot be cleared while {status}")]
    NotClearable { status: UserStatus },

    #[error("job {0} is not in the list")]
    NotListed(JobId),

    #[error("job has already started")]
    AlreadyStarted,

    #[error("job {0} was already submitted")]
    AlreadySubmitted(JobId),

    #[error("job is not ready (state: {state})")]
    NotReady { state: ExecutionState },
}
