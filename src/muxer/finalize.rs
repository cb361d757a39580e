//! One-shot finalize notifications between a muxer backend and the writer
//!
//! A backend reports two milestones: `flushed` (all appended media handed to
//! the container, timeline closed) and `complete` (output fully written).
//! `complete` implies `flushed`. Repeated notifications are ignored.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::backend::MuxerError;

#[derive(Debug, Default)]
struct Progress {
    flushed: bool,
    completed: bool,
    outcome: Option<Result<(), MuxerError>>,
}

#[derive(Debug, Default)]
struct Shared {
    progress: Mutex<Progress>,
    changed: Condvar,
}

/// Waiting side of a finalize operation
#[derive(Debug, Default)]
pub struct FinalizeSignal {
    shared: Arc<Shared>,
}

/// Notifying side handed to the backend. Cheap to clone across threads.
#[derive(Debug, Clone)]
pub struct FinalizeNotifier {
    shared: Arc<Shared>,
}

/// Result of waiting for completion
#[derive(Debug)]
pub enum Completion {
    Finished(Result<(), MuxerError>),
    TimedOut,
}

impl FinalizeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifier(&self) -> FinalizeNotifier {
        FinalizeNotifier {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Wait for the first notification. Returns false if `timeout` elapsed.
    pub fn wait_flushed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut progress = self.shared.progress.lock();
        while !progress.flushed {
            if self
                .shared
                .changed
                .wait_until(&mut progress, deadline)
                .timed_out()
            {
                return progress.flushed;
            }
        }
        true
    }

    /// Wait for completion and take its outcome
    pub fn wait_complete(&self, timeout: Duration) -> Completion {
        let deadline = Instant::now() + timeout;
        let mut progress = self.shared.progress.lock();
        while !progress.completed {
            if self
                .shared
                .changed
                .wait_until(&mut progress, deadline)
                .timed_out()
                && !progress.completed
            {
                return Completion::TimedOut;
            }
        }
        Completion::Finished(progress.outcome.take().unwrap_or(Ok(())))
    }

    /// Whether the backend has reported completion
    pub fn is_complete(&self) -> bool {
        self.shared.progress.lock().completed
    }
}

impl FinalizeNotifier {
    /// All media has been handed to the container
    pub fn flushed(&self) {
        let mut progress = self.shared.progress.lock();
        if progress.flushed {
            return;
        }
        progress.flushed = true;
        self.shared.changed.notify_all();
    }

    /// The output is fully written (or failed to be)
    pub fn complete(&self, outcome: Result<(), MuxerError>) {
        let mut progress = self.shared.progress.lock();
        if progress.completed {
            return;
        }
        progress.flushed = true;
        progress.completed = true;
        progress.outcome = Some(outcome);
        self.shared.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_complete_implies_flushed() {
        let signal = FinalizeSignal::new();
        signal.notifier().complete(Ok(()));
        assert!(signal.wait_flushed(Duration::ZERO));
        assert!(matches!(
            signal.wait_complete(Duration::ZERO),
            Completion::Finished(Ok(()))
        ));
    }

    #[test]
    fn test_flushed_only_times_out_on_complete() {
        let signal = FinalizeSignal::new();
        signal.notifier().flushed();
        assert!(signal.wait_flushed(Duration::from_millis(10)));
        assert!(matches!(
            signal.wait_complete(Duration::from_millis(20)),
            Completion::TimedOut
        ));
        assert!(!signal.is_complete());
    }

    #[test]
    fn test_second_complete_is_ignored() {
        let signal = FinalizeSignal::new();
        let notifier = signal.notifier();
        notifier.complete(Err(MuxerError::Session("disk full".to_string())));
        notifier.complete(Ok(()));
        assert!(matches!(
            signal.wait_complete(Duration::ZERO),
            Completion::Finished(Err(MuxerError::Session(_)))
        ));
    }

    #[test]
    fn test_wait_across_threads() {
        let signal = FinalizeSignal::new();
        let notifier = signal.notifier();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.flushed();
            thread::sleep(Duration::from_millis(20));
            notifier.complete(Ok(()));
        });

        assert!(signal.wait_flushed(Duration::from_secs(5)));
        assert!(matches!(
            signal.wait_complete(Duration::from_secs(5)),
            Completion::Finished(Ok(()))
        ));
        handle.join().unwrap();
    }
}
