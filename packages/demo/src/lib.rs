//! Demo work units and helpers for the job queue manager.

mod sample;

pub use sample::SampleWork;
