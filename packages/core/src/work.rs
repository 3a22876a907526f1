//! The contract every job variant implements.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::job::Job;

/// Future type returned by [`Work::run`].
pub type WorkFuture = BoxFuture<'static, ()>;

/// A variant of work a [`Job`] can run.
///
/// `run` receives the job handle so the work can report progress and poll
/// cancellation. It should return promptly once the job is cancelled; the
/// job is moved to Finished after it returns.
pub trait Work: Send + Sync + 'static {
    /// Short label for this work variant, used in logs.
    fn kind(&self) -> &str;

    /// The work loop.
    fn run(&self, job: Job) -> WorkFuture;

    /// Fresh work for a retry copy, or `None` if this variant cannot be retried.
    ///
    /// May be called more than once per retry and without producing a copy,
    /// so it should be cheap and free of side effects.
    fn respawn(&self) -> Option<Arc<dyn Work>>;
}

/// A closure-based work variant.
pub struct FnWork<F>
where
    F: Fn(Job) -> WorkFuture + Send + Sync + 'static,
{
    kind: String,
    run: Arc<F>,
}

impl<F> FnWork<F>
where
    F: Fn(Job) -> WorkFuture + Send + Sync + 'static,
{
    pub fn new(kind: impl Into<String>, run: F) -> Self {
        Self {
            kind: kind.into(),
            run: Arc::new(run),
        }
    }
}

impl<F> Work for FnWork<F>
where
    F: Fn(Job) -> WorkFuture + Send + Sync + 'static,
{
    fn kind(&self) -> &str {
        &self.kind
    }

    fn run(&self, job: Job) -> WorkFuture {
        (self.run)(job)
    }

    fn respawn(&self) -> Option<Arc<dyn Work>> {
        Some(Arc::new(FnWork {
            kind: self.kind.clone(),
            run: Arc::clone(&self.run),
        }))
    }
}
