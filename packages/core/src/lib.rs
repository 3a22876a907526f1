//! Core domain types for the job queue manager.
//!
//! This crate contains shared types used across all packages:
//! - Job, its execution state machine and derived user status
//! - The `Work` contract that job variants implement
//! - List events for observers
//! - Engine and manager configuration

mod config;
mod error;
mod events;
mod job;
mod work;

pub use config::{ConfigError, EngineConfig, ManagerConfig};
pub use error::Rejected;
pub use events::ListEvent;
pub use job::{
    ExecutionState, Job, JobEntry, JobId, JobObserver, JobSnapshot, Launch, UserStatus,
};
pub use work::{FnWork, Work, WorkFuture};
