//! Event types for observers of the job list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, JobSnapshot};

/// Changes to the ordered job list, as published to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ListEvent {
    /// A job was appended (or moved) to `index`.
    Inserted {
        index: usize,
        job: JobSnapshot,
        timestamp: DateTime<Utc>,
    },
    /// The job at `index` was removed.
    Removed {
        index: usize,
        job: JobSnapshot,
        timestamp: DateTime<Utc>,
    },
    /// The job at `index` has new state.
    Updated {
        index: usize,
        job: JobSnapshot,
        timestamp: DateTime<Utc>,
    },
    /// The slot at `index` now holds a retry copy of `previous`.
    Replaced {
        index: usize,
        previous: JobSnapshot,
        job: JobSnapshot,
        timestamp: DateTime<Utc>,
    },
}

impl ListEvent {
    pub fn inserted(index: usize, job: JobSnapshot) -> Self {
        ListEvent::Inserted {
            index,
            job,
            timestamp: Utc::now(),
        }
    }

    pub fn removed(index: usize, job: JobSnapshot) -> Self {
        ListEvent::Removed {
            index,
            job,
            timestamp: Utc::now(),
        }
    }

    pub fn updated(index: usize, job: JobSnapshot) -> Self {
        ListEvent::Updated {
            index,
            job,
            timestamp: Utc::now(),
        }
    }

    pub fn replaced(index: usize, previous: JobSnapshot, job: JobSnapshot) -> Self {
        ListEvent::Replaced {
            index,
            previous,
            job,
            timestamp: Utc::now(),
        }
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ListEvent::Inserted { timestamp, .. }
            | ListEvent::Removed { timestamp, .. }
            | ListEvent::Updated { timestamp, .. }
            | ListEvent::Replaced { timestamp, .. } => *timestamp,
        }
    }

    /// List position the event refers to.
    pub fn index(&self) -> usize {
        match self {
            ListEvent::Inserted { index, .. }
            | ListEvent::Removed { index, .. }
            | ListEvent::Updated { index, .. }
            | ListEvent::Replaced { index, .. } => *index,
        }
    }

    /// The job the slot holds after the event (or held, for removals).
    pub fn job(&self) -> &JobSnapshot {
        match self {
            ListEvent::Inserted { job, .. }
            | ListEvent::Removed { job, .. }
            | ListEvent::Updated { job, .. }
            | ListEvent::Replaced { job, .. } => job,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job().id
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            ListEvent::Inserted { index, job, .. } => {
                format!("Job '{}' inserted at {}", job.name, index)
            }
            ListEvent::Removed { index, job, .. } => {
                format!("Job '{}' removed from {}", job.name, index)
            }
            ListEvent::Updated { index, job, .. } => format!(
                "Job '{}' at {} -> {} ({}%)",
                job.name,
                index,
                job.user_status(),
                job.progress
            ),
            ListEvent::Replaced {
                index,
                previous,
                job,
                ..
            } => format!(
                "Job '{}' at {} replaced by retry {}",
                previous.name, index, job.id
            ),
        }
    }
}
