// Background renewal loop

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::manager::CredentialManager;

/// Default pause between renewal checks (6 hours)
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 21_600;

/// How long `stop` waits for the loop before aborting it
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Handle to a running renewal loop
pub(crate) struct Renewer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Renewer {
    /// Spawn the loop. It holds only a weak reference, so dropping the
    /// manager also ends the loop at its next wake-up.
    pub(crate) fn spawn(manager: &Arc<CredentialManager>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(Arc::downgrade(manager), interval, cancel.clone()));
        Self { cancel, handle }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop and wait for it to exit
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        let mut handle = self.handle;
        if tokio::time::timeout(STOP_GRACE, &mut handle).await.is_err() {
            tracing::warn!("Background refresh did not stop in time, aborting");
            handle.abort();
        }
    }
}

async fn run(manager: Weak<CredentialManager>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        "Background token refresh started (check interval: {:.1} hours)",
        interval.as_secs_f64() / 3600.0
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(strong) = manager.upgrade() else {
            break;
        };

        // Runs to completion once started so the store and the file agree.
        // Failures are logged inside; the loop keeps going regardless.
        strong.refresh_if_needed().await;
    }

    tracing::info!("Background token refresh stopped");
}
