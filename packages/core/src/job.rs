//! Job handle, its execution state machine and derived user-facing status.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::error::Rejected;
use crate::work::{Work, WorkFuture};

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduler-facing state. Moves forward only: Ready -> Executing -> Finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Eligible to be launched.
    #[default]
    Ready,
    /// Currently running its work.
    Executing,
    /// Terminal.
    Finished,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Ready => "ready",
            ExecutionState::Executing => "executing",
            ExecutionState::Finished => "finished",
        }
    }

    fn rank(self) -> u8 {
        match self {
            ExecutionState::Ready => 0,
            ExecutionState::Executing => 1,
            ExecutionState::Finished => 2,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_advance_to(self, next: ExecutionState) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status shown to consumers, derived from the cancellation flag and execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Queued,
    Processing,
    Cancelled,
    Finished,
}

impl UserStatus {
    /// Cancellation wins over whatever the execution state says.
    pub fn derive(cancelled: bool, state: ExecutionState) -> Self {
        if cancelled {
            return UserStatus::Cancelled;
        }
        match state {
            ExecutionState::Ready => UserStatus::Queued,
            ExecutionState::Executing => UserStatus::Processing,
            ExecutionState::Finished => UserStatus::Finished,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Queued => "Queued",
            UserStatus::Processing => "Processing",
            UserStatus::Cancelled => "Cancelled",
            UserStatus::Finished => "Finished",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistent copy of a job's state at a single revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub name: String,
    pub execution_state: ExecutionState,
    pub cancelled: bool,
    pub has_started: bool,
    pub was_copied_for_retry: bool,
    pub progress: u32,
    /// Bumped on every observable mutation of the job.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn user_status(&self) -> UserStatus {
        UserStatus::derive(self.cancelled, self.execution_state)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(
            self.user_status(),
            UserStatus::Queued | UserStatus::Processing
        )
    }

    pub fn can_retry(&self) -> bool {
        self.user_status() == UserStatus::Cancelled
    }

    pub fn can_clear(&self) -> bool {
        (!self.has_started && self.user_status() == UserStatus::Cancelled)
            || self.execution_state == ExecutionState::Finished
    }

    pub fn can_pause(&self) -> bool {
        matches!(
            self.user_status(),
            UserStatus::Processing | UserStatus::Queued | UserStatus::Cancelled
        )
    }
}

/// Outcome of [`Job::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// The job is now Executing; its work must be run.
    Run,
    /// The job was cancelled before launch and went straight to Finished.
    Skipped,
}

/// Receives a job's change notifications.
///
/// Called with the job's lock held, in revision order. Implementations must
/// not call back into the job; forward the snapshot somewhere instead.
pub trait JobObserver: Send + Sync + 'static {
    fn job_changed(&self, snapshot: &JobSnapshot);
}

struct JobCell {
    state: ExecutionState,
    cancelled: bool,
    has_started: bool,
    was_copied_for_retry: bool,
    progress: u32,
    revision: u64,
    observers: Vec<Arc<dyn JobObserver>>,
}

impl JobCell {
    fn check_retry(&self) -> Result<(), Rejected> {
        if self.was_copied_for_retry {
            return Err(Rejected::AlreadyCopied);
        }
        let status = UserStatus::derive(self.cancelled, self.state);
        if status != UserStatus::Cancelled {
            return Err(Rejected::NotRetryable { status });
        }
        Ok(())
    }
}

struct JobInner {
    id: JobId,
    name: String,
    created_at: DateTime<Utc>,
    work: Arc<dyn Work>,
    cancel_token: CancellationToken,
    cell: Mutex<JobCell>,
}

/// A cancellable, progress-reporting unit of work.
///
/// `Job` is a cheap handle; clones share the same state. Equality and
/// hashing go by [`JobId`] only.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl Job {
    /// Create a new Ready job running `work`.
    pub fn new(name: impl Into<String>, work: Arc<dyn Work>) -> Self {
        Self::seeded(name.into(), work, 0)
    }

    /// Create a new Ready job from a concrete work value.
    pub fn with_work<W: Work>(name: impl Into<String>, work: W) -> Self {
        Self::new(name, Arc::new(work))
    }

    fn seeded(name: String, work: Arc<dyn Work>, progress: u32) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id: JobId::new(),
                name,
                created_at: Utc::now(),
                work,
                cancel_token: CancellationToken::new(),
                cell: Mutex::new(JobCell {
                    state: ExecutionState::Ready,
                    cancelled: false,
                    has_started: false,
                    was_copied_for_retry: false,
                    progress,
                    revision: 0,
                    observers: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Label of the work variant this job runs.
    pub fn kind(&self) -> &str {
        self.inner.work.kind()
    }

    fn lock(&self) -> MutexGuard<'_, JobCell> {
        self.inner.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_of(&self, cell: &JobCell) -> JobSnapshot {
        JobSnapshot {
            id: self.inner.id,
            name: self.inner.name.clone(),
            execution_state: cell.state,
            cancelled: cell.cancelled,
            has_started: cell.has_started,
            was_copied_for_retry: cell.was_copied_for_retry,
            progress: cell.progress,
            revision: cell.revision,
            created_at: self.inner.created_at,
        }
    }

    /// Bump the revision and notify every subscriber.
    fn commit(&self, cell: &mut JobCell) {
        cell.revision += 1;
        if cell.observers.is_empty() {
            return;
        }
        let snapshot = self.snapshot_of(cell);
        for observer in &cell.observers {
            observer.job_changed(&snapshot);
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let cell = self.lock();
        self.snapshot_of(&cell)
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.lock().state
    }

    pub fn user_status(&self) -> UserStatus {
        let cell = self.lock();
        UserStatus::derive(cell.cancelled, cell.state)
    }

    pub fn progress(&self) -> u32 {
        self.lock().progress
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn has_started(&self) -> bool {
        self.lock().has_started
    }

    pub fn was_copied_for_retry(&self) -> bool {
        self.lock().was_copied_for_retry
    }

    pub fn can_cancel(&self) -> bool {
        self.snapshot().can_cancel()
    }

    pub fn can_retry(&self) -> bool {
        self.snapshot().can_retry()
    }

    pub fn can_clear(&self) -> bool {
        self.snapshot().can_clear()
    }

    pub fn can_pause(&self) -> bool {
        self.snapshot().can_pause()
    }

    /// Register a change subscriber. Registering the same observer twice is a no-op.
    pub fn subscribe(&self, observer: Arc<dyn JobObserver>) {
        let mut cell = self.lock();
        let known = cell
            .observers
            .iter()
            .any(|o| std::ptr::addr_eq(Arc::as_ptr(o), Arc::as_ptr(&observer)));
        if !known {
            cell.observers.push(observer);
        }
    }

    /// Token that fires when the job is cancelled, for `select!`-style work loops.
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel_token.clone()
    }

    /// Resolves once the job has been cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancel_token.cancelled().await;
    }

    /// Launch transition, performed once by the executor.
    ///
    /// Marks the job started; a cancelled job goes straight to Finished.
    pub fn begin(&self) -> Result<Launch, Rejected> {
        let mut cell = self.lock();
        if cell.has_started {
            return Err(Rejected::AlreadyStarted);
        }
        if cell.state != ExecutionState::Ready {
            return Err(Rejected::NotReady { state: cell.state });
        }

        cell.has_started = true;
        let launch = if cell.cancelled {
            cell.state = ExecutionState::Finished;
            Launch::Skipped
        } else {
            cell.state = ExecutionState::Executing;
            Launch::Run
        };
        self.commit(&mut cell);
        Ok(launch)
    }

    /// Move an Executing job to Finished. No-op in any other state.
    ///
    /// Executors call this when the work ends abnormally; [`Job::execute`]
    /// calls it after normal completion.
    pub fn finish(&self) {
        let mut cell = self.lock();
        if cell.state != ExecutionState::Executing {
            return;
        }
        cell.state = ExecutionState::Finished;
        self.commit(&mut cell);
    }

    /// Future that runs this job's work and then finishes the job.
    ///
    /// Only meaningful after [`Job::begin`] returned [`Launch::Run`].
    pub fn execute(&self) -> WorkFuture {
        let job = self.clone();
        let work = Arc::clone(&self.inner.work);
        Box::pin(async move {
            work.run(job.clone()).await;
            job.finish();
        })
    }

    /// Launch and, unless skipped, run the job to completion.
    pub async fn start(&self) -> Result<Launch, Rejected> {
        let launch = self.begin()?;
        if launch == Launch::Run {
            self.execute().await;
        }
        Ok(launch)
    }

    /// Request cooperative cancellation.
    ///
    /// Does not finish the job; running work must notice the flag and return.
    pub fn cancel(&self) -> Result<(), Rejected> {
        {
            let mut cell = self.lock();
            let status = UserStatus::derive(cell.cancelled, cell.state);
            if !matches!(status, UserStatus::Queued | UserStatus::Processing) {
                return Err(Rejected::NotCancellable { status });
            }
            cell.cancelled = true;
            self.commit(&mut cell);
        }
        self.inner.cancel_token.cancel();
        Ok(())
    }

    /// Cancel only if the job is still Queued and has never been launched.
    pub fn cancel_unstarted(&self) -> Result<(), Rejected> {
        {
            let mut cell = self.lock();
            let status = UserStatus::derive(cell.cancelled, cell.state);
            if cell.has_started || status != UserStatus::Queued {
                return Err(Rejected::NotCancellable { status });
            }
            cell.cancelled = true;
            self.commit(&mut cell);
        }
        self.inner.cancel_token.cancel();
        Ok(())
    }

    /// Raise progress to `progress`. Lower values are ignored.
    pub fn set_progress(&self, progress: u32) {
        let mut cell = self.lock();
        if progress <= cell.progress {
            return;
        }
        cell.progress = progress;
        self.commit(&mut cell);
    }

    /// Add `by` to the progress counter and return the new value.
    pub fn advance(&self, by: u32) -> u32 {
        let mut cell = self.lock();
        if by == 0 {
            return cell.progress;
        }
        cell.progress = cell.progress.saturating_add(by);
        self.commit(&mut cell);
        cell.progress
    }

    /// Whether this job's work variant can produce a retry copy.
    pub fn supports_retry(&self) -> bool {
        self.inner.work.respawn().is_some()
    }

    /// Build the job that replaces this one on retry.
    ///
    /// The copy has a fresh id, the same name and the current progress. At
    /// most one copy is ever produced per job.
    pub fn copy_for_retry(&self) -> Result<Job, Rejected> {
        self.lock().check_retry()?;
        // Called unlocked: `respawn` may read this job.
        let work = self
            .inner
            .work
            .respawn()
            .ok_or(Rejected::RetryUnsupported)?;

        let mut cell = self.lock();
        // Another caller may have copied it while `respawn` ran.
        cell.check_retry()?;
        cell.was_copied_for_retry = true;
        let progress = cell.progress;
        self.commit(&mut cell);
        drop(cell);

        let copy = Job::seeded(self.inner.name.clone(), work, progress);
        tracing::debug!("Job {} copied for retry as {}", self.inner.id, copy.id());
        Ok(copy)
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Job {}

impl Hash for Job {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("Job")
            .field("id", &snapshot.id)
            .field("name", &snapshot.name)
            .field("status", &snapshot.user_status())
            .field("progress", &snapshot.progress)
            .finish()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} - {}", self.id(), self.name(), self.user_status())
    }
}

/// A job handle paired with the latest snapshot its holder has seen.
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub job: Job,
    pub snapshot: JobSnapshot,
}

impl JobEntry {
    /// Pair a job with a fresh snapshot of itself.
    pub fn capture(job: Job) -> Self {
        let snapshot = job.snapshot();
        Self { job, snapshot }
    }

    pub fn id(&self) -> JobId {
        self.snapshot.id
    }

    pub fn name(&self) -> &str {
        &self.snapshot.name
    }

    pub fn user_status(&self) -> UserStatus {
        self.snapshot.user_status()
    }

    pub fn progress(&self) -> u32 {
        self.snapshot.progress
    }

    /// Replace the stored snapshot if `snapshot` is newer. Returns whether it was.
    pub fn refresh(&mut self, snapshot: JobSnapshot) -> bool {
        if snapshot.id != self.snapshot.id || snapshot.revision < self.snapshot.revision {
            return false;
        }
        self.snapshot = snapshot;
        true
    }
}
