use std::sync::{Arc, Weak};

use crate::store::SessionStore;
use crate::{Error, Result};

/// Exit status used after a signal-driven shutdown (128 + SIGINT).
pub const SIGNAL_EXIT_CODE: i32 = 130;

/// Run `store.shutdown()` on SIGINT/SIGTERM/SIGHUP before the process exits.
///
/// The handler only keeps a weak reference, so dropping the last caller
/// handle still shuts the store down through `Drop` on a normal exit.
/// Only one handler can be installed per process; a second call fails with
/// [`Error::Config`].
pub fn install_exit_handler(store: &Arc<SessionStore>) -> Result<()> {
    let store: Weak<SessionStore> = Arc::downgrade(store);
    ctrlc::set_handler(move || {
        match store.upgrade() {
            Some(store) => {
                tracing::info!(pid = store.pid(), "termination signal, shutting down store");
                store.shutdown();
            }
            None => tracing::info!("termination signal, store already closed"),
        }
        std::process::exit(SIGNAL_EXIT_CODE);
    })
    .map_err(|err| Error::Config(format!("failed to install exit handler: {}", err)))
}
