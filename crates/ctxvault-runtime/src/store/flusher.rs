use std::sync::Arc;
use std::sync::mpsc::{RecvTimeoutError, Sender, channel};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::StoreInner;

enum FlushSignal {
    Schedule,
    Stop,
}

/// Debounced durable flush.
///
/// The first `schedule` after an idle period opens a window of `debounce`;
/// every further `schedule` inside that window is folded into the one flush
/// that runs when it closes. A failed flush stays pending and opens the next
/// window itself.
pub(crate) struct Flusher {
    tx: Sender<FlushSignal>,
    handle: JoinHandle<()>,
}

impl Flusher {
    pub(crate) fn start(inner: Arc<StoreInner>, debounce: Duration) -> std::io::Result<Self> {
        let (tx, rx) = channel();

        let handle = std::thread::Builder::new()
            .name("ctxvault-flusher".to_string())
            .spawn(move || {
                let mut deadline: Option<Instant> = None;
                loop {
                    let signal = match deadline {
                        Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };

                    match signal {
                        Ok(FlushSignal::Schedule) => {
                            if deadline.is_none() {
                                deadline = Some(Instant::now() + debounce);
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            deadline = None;
                            if let Err(err) = inner.flush_pending() {
                                tracing::warn!(error = %err, "flush failed, retrying next window");
                                deadline = Some(Instant::now() + debounce);
                            }
                        }
                        Ok(FlushSignal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(Self { tx, handle })
    }

    pub(crate) fn schedule(&self) {
        let _ = self.tx.send(FlushSignal::Schedule);
    }

    /// Stop the thread without flushing; the caller forces the final flush.
    pub(crate) fn stop(self) {
        let _ = self.tx.send(FlushSignal::Stop);
        if self.handle.join().is_err() {
            tracing::warn!("flusher thread panicked");
        }
    }
}
