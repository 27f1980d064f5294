use std::sync::Arc;
use std::sync::mpsc::{RecvTimeoutError, Sender, channel};
use std::thread::JoinHandle;
use std::time::Duration;

use super::StoreInner;

/// Background timer refreshing `last_heartbeat` for every session this
/// process owns. Dropping the stop sender or calling [`Heartbeat::stop`]
/// ends the thread at its next wake-up.
pub(crate) struct Heartbeat {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub(crate) fn start(inner: Arc<StoreInner>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = channel::<()>();

        let handle = std::thread::Builder::new()
            .name("ctxvault-heartbeat".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => inner.beat_owned(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(Self {
            stop: stop_tx,
            handle,
        })
    }

    pub(crate) fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::warn!("heartbeat thread panicked");
        }
    }
}
