use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ctxvault_core::SessionLogPath;

use crate::Error;
use crate::store::SessionStore;

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Lines already written to the log file but not yet mirrored into the store.
#[derive(Debug, Clone)]
pub(crate) struct DeferredBatch {
    pub source: SessionLogPath,
    pub lines: Vec<String>,
}

/// Queued batch counts per session.
#[derive(Debug, Default)]
pub(crate) struct PendingBatches(Mutex<HashMap<String, usize>>);

impl PendingBatches {
    fn counts(&self) -> std::sync::MutexGuard<'_, HashMap<String, usize>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, session_id: &str) {
        *self.counts().entry(session_id.to_string()).or_default() += 1;
    }

    fn done(&self, session_id: &str) {
        let mut counts = self.counts();
        if let Some(count) = counts.get_mut(session_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(session_id);
            }
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.counts().values().sum()
    }

    pub(crate) fn for_session(&self, session_id: &str) -> usize {
        self.counts().get(session_id).copied().unwrap_or(0)
    }
}

enum Message {
    Push(DeferredBatch),
    Stop,
}

/// Background retry of store appends that hit lock contention or a busy
/// store. Batches are retried in arrival order with capped exponential
/// backoff; on shutdown every batch gets one last attempt.
pub(crate) struct DeferredQueue {
    tx: Sender<Message>,
    handle: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<PendingBatches>,
}

impl DeferredQueue {
    pub(crate) fn start(
        store: Arc<SessionStore>,
        attempt_timeout: Duration,
        max_backoff: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = channel();
        let pending = Arc::new(PendingBatches::default());
        let worker = Worker {
            store,
            attempt_timeout,
            pending: Arc::clone(&pending),
        };

        let handle = std::thread::Builder::new()
            .name("ctxvault-deferred".to_string())
            .spawn(move || {
                let mut queue: VecDeque<DeferredBatch> = VecDeque::new();
                let mut backoff = INITIAL_BACKOFF.min(max_backoff);
                let mut next_attempt = Instant::now();

                loop {
                    let message = if queue.is_empty() {
                        rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
                    } else {
                        rx.recv_timeout(next_attempt.saturating_duration_since(Instant::now()))
                    };

                    match message {
                        Ok(Message::Push(batch)) => {
                            if queue.is_empty() {
                                backoff = INITIAL_BACKOFF.min(max_backoff);
                                next_attempt = Instant::now() + backoff;
                            }
                            queue.push_back(batch);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if worker.drain(&mut queue) {
                                backoff = INITIAL_BACKOFF.min(max_backoff);
                            } else {
                                backoff = (backoff * 2).min(max_backoff);
                                next_attempt = Instant::now() + backoff;
                            }
                        }
                        Ok(Message::Stop) | Err(RecvTimeoutError::Disconnected) => {
                            worker.final_attempt(&mut queue);
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
            pending,
        })
    }

    pub(crate) fn push(&self, batch: DeferredBatch) {
        let session_id = batch.source.session_id.clone();
        self.pending.add(&session_id);
        if self.tx.send(Message::Push(batch)).is_err() {
            self.pending.done(&session_id);
            tracing::warn!(
                session_id = %session_id,
                "deferred queue stopped, batch left in log file only"
            );
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.total()
    }

    /// Batches still queued for `session_id`.
    pub(crate) fn pending_for(&self, session_id: &str) -> usize {
        self.pending.for_session(session_id)
    }

    /// Stop the worker after one last attempt at every queued batch.
    pub(crate) fn shutdown(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = self.tx.send(Message::Stop);
            if handle.join().is_err() {
                tracing::warn!("deferred retry thread panicked");
            }
        }
    }
}

struct Worker {
    store: Arc<SessionStore>,
    attempt_timeout: Duration,
    pending: Arc<PendingBatches>,
}

enum Attempt {
    Done,
    Retry,
}

impl Worker {
    fn attempt(&self, batch: &DeferredBatch) -> Attempt {
        let result = self.store.append_with_timeout(
            &batch.source.session_id,
            &batch.lines,
            Some(&batch.source),
            self.attempt_timeout,
        );
        match result {
            Ok(outcome) => {
                tracing::debug!(
                    session_id = %batch.source.session_id,
                    first_line = outcome.first_line,
                    "deferred append mirrored"
                );
                Attempt::Done
            }
            Err(err @ (Error::InvalidInput(_) | Error::Shutdown)) => {
                tracing::warn!(
                    session_id = %batch.source.session_id,
                    error = %err,
                    "dropping deferred append"
                );
                Attempt::Done
            }
            Err(err) => {
                tracing::debug!(
                    session_id = %batch.source.session_id,
                    error = %err,
                    "deferred append still failing"
                );
                Attempt::Retry
            }
        }
    }

    /// Retry from the front until one fails. Returns true when the queue
    /// emptied.
    fn drain(&self, queue: &mut VecDeque<DeferredBatch>) -> bool {
        while let Some(batch) = queue.front() {
            match self.attempt(batch) {
                Attempt::Done => {
                    self.pending.done(&batch.source.session_id);
                    queue.pop_front();
                }
                Attempt::Retry => return false,
            }
        }
        true
    }

    fn final_attempt(&self, queue: &mut VecDeque<DeferredBatch>) {
        let mut lost = 0usize;
        while let Some(batch) = queue.pop_front() {
            if let Attempt::Retry = self.attempt(&batch) {
                lost += batch.lines.len();
            }
            self.pending.done(&batch.source.session_id);
        }
        if lost > 0 {
            tracing::warn!(lines = lost, "deferred appends not mirrored before shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_batches_are_counted_per_session() {
        let pending = PendingBatches::default();
        pending.add("a");
        pending.add("a");
        pending.add("b");
        assert_eq!(pending.total(), 3);
        assert_eq!(pending.for_session("a"), 2);

        pending.done("a");
        pending.done("b");
        pending.done("b");
        assert_eq!(pending.for_session("a"), 1);
        assert_eq!(pending.for_session("b"), 0);
        assert_eq!(pending.total(), 1);
    }
}
