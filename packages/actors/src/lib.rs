//! Actor system for the job queue manager.
//!
//! This crate provides the Ractor-based actors that run jobs and keep the
//! observable job list.
//!
//! # Architecture
//!
//! - `ManagerActor` - Owns the ordered job list; every list mutation and
//!   observer callback happens inside it
//! - `EngineActor` - Linked child of the manager; runs submitted jobs FIFO
//!   with a concurrency limit, one tokio task per executing job
//!
//! # Usage
//!
//! ```ignore
//! use actors::JobManager;
//! use queue_core::{Job, ManagerConfig};
//!
//! let (manager, _handle) = JobManager::start(ManagerConfig::default()).await?;
//! let mut events = manager.subscribe();
//! manager.add(Job::with_work("Job 1", work)).await?;
//! ```

mod engine_actor;
mod manager;
mod manager_actor;
mod messages;
mod observer;

pub use engine_actor::{EngineActor, EngineState};
pub use manager::JobManager;
pub use manager_actor::{ManagerActor, ManagerArgs};
pub use messages::{EngineMessage, EngineStats, ManagerError, ManagerMessage};
pub use observer::{Callbacks, ListObserver, TracingObserver};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
