//! Per-table operation state and its control channel.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::{SyncProgress, SyncState};

/// Signal read by the chunk loop at chunk boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Run,
    Pause,
    Stop,
}

/// One table sync: its progress and the sender half of its control channel.
///
/// Signals are sent while holding the progress lock, and the loop reports
/// completion while holding the same lock, so a signal is either observed
/// before completion or refused.
#[derive(Debug)]
pub(crate) struct Operation {
    progress: Mutex<SyncProgress>,
    control: watch::Sender<Control>,
}

impl Operation {
    pub(crate) fn new(progress: SyncProgress) -> (Arc<Self>, watch::Receiver<Control>) {
        let (control, receiver) = watch::channel(Control::Run);
        let operation = Arc::new(Self {
            progress: Mutex::new(progress),
            control,
        });
        (operation, receiver)
    }

    pub(crate) fn snapshot(&self) -> SyncProgress {
        self.progress.lock().clone()
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.progress.lock().state.is_terminal()
    }

    /// Applies `f` to the progress and returns a copy of the result.
    pub(crate) fn update(&self, f: impl FnOnce(&mut SyncProgress)) -> SyncProgress {
        let mut progress = self.progress.lock();
        f(&mut progress);
        progress.clone()
    }

    /// Marks the operation completed unless a signal is pending. Returns the
    /// final progress on success.
    pub(crate) fn try_complete(&self) -> Option<SyncProgress> {
        let mut progress = self.progress.lock();
        if *self.control.borrow() != Control::Run {
            return None;
        }
        progress.transition(SyncState::Completed);
        Some(progress.clone())
    }

    pub(crate) fn pause(&self) -> bool {
        self.signal(Control::Pause, |current| current == Control::Run)
    }

    pub(crate) fn resume(&self) -> bool {
        self.signal(Control::Run, |current| current == Control::Pause)
    }

    pub(crate) fn stop(&self) -> bool {
        self.signal(Control::Stop, |current| current != Control::Stop)
    }

    fn signal(&self, next: Control, allowed: impl FnOnce(Control) -> bool) -> bool {
        let progress = self.progress.lock();
        if progress.state.is_terminal() || !allowed(*self.control.borrow()) {
            return false;
        }
        self.control.send_replace(next);
        true
    }
}

/// Fails the operation if the sync future is dropped before finishing.
pub(crate) struct OperationGuard {
    operation: Arc<Operation>,
}

impl OperationGuard {
    pub(crate) const fn new(operation: Arc<Operation>) -> Self {
        Self { operation }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let mut progress = self.operation.progress.lock();
        if !progress.state.is_terminal() {
            let message = format!("Sync of table '{}' was cancelled", progress.table_name);
            progress.fail(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncStrategy;

    fn running() -> (Arc<Operation>, watch::Receiver<Control>) {
        let (operation, rx) = Operation::new(SyncProgress::new("movies", SyncStrategy::IdRange));
        operation.update(|p| {
            p.transition(SyncState::Running);
        });
        (operation, rx)
    }

    #[test]
    fn test_pause_blocks_completion() {
        let (operation, rx) = running();
        assert!(!operation.resume());
        assert!(operation.pause());
        assert!(!operation.pause());
        assert_eq!(*rx.borrow(), Control::Pause);
        assert!(operation.try_complete().is_none());

        assert!(operation.resume());
        let done = operation.try_complete().unwrap();
        assert_eq!(done.state, SyncState::Completed);
        assert!(!operation.pause());
        assert!(!operation.stop());
    }

    #[test]
    fn test_dropped_guard_fails_operation() {
        let (operation, _rx) = running();
        drop(OperationGuard::new(Arc::clone(&operation)));
        let progress = operation.snapshot();
        assert_eq!(progress.state, SyncState::Failed);
        assert!(progress.error.unwrap().contains("cancelled"));
        assert!(!operation.is_active());
    }
}
