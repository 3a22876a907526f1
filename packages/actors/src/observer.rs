//! List observers.

use queue_core::JobEntry;

/// Receives changes to the manager's job list.
///
/// All calls happen on the manager actor, one at a time, in the order the
/// list changed. Indices refer to the list right after the change (for
/// removals, the position the job had).
pub trait ListObserver: Send + 'static {
    fn did_insert(&mut self, _index: usize, _entry: &JobEntry) {}

    fn did_remove(&mut self, _index: usize, _entry: &JobEntry) {}

    fn did_update(&mut self, _index: usize, _entry: &JobEntry) {}

    /// The slot at `index` now holds `entry`, a retry copy of `previous`.
    fn did_replace(&mut self, _index: usize, _previous: &JobEntry, _entry: &JobEntry) {}
}

type EntryCallback = Box<dyn FnMut(usize, &JobEntry) + Send>;
type ReplaceCallback = Box<dyn FnMut(usize, &JobEntry, &JobEntry) + Send>;

/// Closure-based observer.
#[derive(Default)]
pub struct Callbacks {
    on_insert: Option<EntryCallback>,
    on_remove: Option<EntryCallback>,
    on_update: Option<EntryCallback>,
    on_replace: Option<ReplaceCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_insert(mut self, f: impl FnMut(usize, &JobEntry) + Send + 'static) -> Self {
        self.on_insert = Some(Box::new(f));
        self
    }

    pub fn on_remove(mut self, f: impl FnMut(usize, &JobEntry) + Send + 'static) -> Self {
        self.on_remove = Some(Box::new(f));
        self
    }

    pub fn on_update(mut self, f: impl FnMut(usize, &JobEntry) + Send + 'static) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    pub fn on_replace(
        mut self,
        f: impl FnMut(usize, &JobEntry, &JobEntry) + Send + 'static,
    ) -> Self {
        self.on_replace = Some(Box::new(f));
        self
    }
}

impl ListObserver for Callbacks {
    fn did_insert(&mut self, index: usize, entry: &JobEntry) {
        if let Some(f) = self.on_insert.as_mut() {
            f(index, entry);
        }
    }

    fn did_remove(&mut self, index: usize, entry: &JobEntry) {
        if let Some(f) = self.on_remove.as_mut() {
            f(index, entry);
        }
    }

    fn did_update(&mut self, index: usize, entry: &JobEntry) {
        if let Some(f) = self.on_update.as_mut() {
            f(index, entry);
        }
    }

    fn did_replace(&mut self, index: usize, previous: &JobEntry, entry: &JobEntry) {
        if let Some(f) = self.on_replace.as_mut() {
            f(index, previous, entry);
        }
    }
}

/// Logs every list change.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ListObserver for TracingObserver {
    fn did_insert(&mut self, index: usize, entry: &JobEntry) {
        tracing::info!("[{}] + {} ({})", index, entry.name(), entry.user_status());
    }

    fn did_remove(&mut self, index: usize, entry: &JobEntry) {
        tracing::info!("[{}] - {}", index, entry.name());
    }

    fn did_update(&mut self, index: usize, entry: &JobEntry) {
        tracing::debug!(
            "[{}] {} {} {}%",
            index,
            entry.name(),
            entry.user_status(),
            entry.progress()
        );
    }

    fn did_replace(&mut self, index: usize, previous: &JobEntry, entry: &JobEntry) {
        tracing::info!(
            "[{}] {} retried as {} from {}%",
            index,
            previous.name(),
            entry.id(),
            entry.progress()
        );
    }
}
