//! Sink lifetimes: how long an installed sink stays registered without an
//! explicit `uninstall`.

use std::time::Duration;

use tokio::sync::oneshot;

/// How long a sink stays installed once `install` returns.
pub enum Lifetime {
    /// Stays until explicitly uninstalled or the channel is deleted.
    Infinity,
    /// Expires after the given duration, measured from install. Bounded to
    /// under 2^32 milliseconds by the registry before it ever reaches here.
    Duration(Duration),
    /// Expires when the external process/task this handle watches
    /// terminates. The core never spawns or owns that task itself — the
    /// caller does, and hands over a [`ProcessHandle`] — consistent with
    /// the process supervision tree below a channel being an external
    /// collaborator.
    ExternalProcess(ProcessHandle),
}

/// The watcher's half of a process-bound lifetime: resolves once the
/// paired [`ProcessGuard`] finishes or is dropped.
pub struct ProcessHandle(oneshot::Receiver<()>);

/// The owner's half: held by (or passed into) the subordinate task whose
/// liveness a sink's lifetime is bound to.
pub struct ProcessGuard(Option<oneshot::Sender<()>>);

impl ProcessGuard {
    /// Creates a linked guard/handle pair. Dropping the guard or calling
    /// `finish` both count as termination.
    pub fn new() -> (Self, ProcessHandle) {
        let (tx, rx) = oneshot::channel();
        (Self(Some(tx)), ProcessHandle(rx))
    }

    pub fn finish(mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Cancels a pending lifetime watcher. Cancelling one that already fired
/// (the watcher task has exited) is a harmless no-op.
pub(crate) struct CancelHandle(oneshot::Sender<()>);

impl CancelHandle {
    pub(crate) fn new(tx: oneshot::Sender<()>) -> Self {
        Self(tx)
    }

    pub(crate) fn cancel(self) {
        let _ = self.0.send(());
    }
}

/// Awaits a lifetime's natural expiry, racing it against cancellation.
/// Returns `true` if the lifetime expired, `false` if it was cancelled
/// first. `Infinity` never expires; it simply waits for cancellation.
pub(crate) async fn await_expiry(lifetime: Lifetime, cancel: oneshot::Receiver<()>) -> bool {
    match lifetime {
        Lifetime::Infinity => {
            let _ = cancel.await;
            false
        }
        Lifetime::Duration(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = cancel => false,
            }
        }
        Lifetime::ExternalProcess(handle) => {
            tokio::select! {
                _ = handle.0 => true,
                _ = cancel => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn duration_lifetime_expires() {
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let expired = await_expiry(Lifetime::Duration(Duration::from_millis(10)), cancel_rx).await;
        assert!(expired);
    }

    #[tokio::test]
    async fn cancelling_prevents_expiry() {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(await_expiry(Lifetime::Duration(Duration::from_secs(60)), cancel_rx));
        cancel_tx.send(()).unwrap();
        assert!(!task.await.unwrap());
    }

    #[tokio::test]
    async fn process_guard_drop_triggers_expiry() {
        let (guard, handle) = ProcessGuard::new();
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(await_expiry(Lifetime::ExternalProcess(handle), cancel_rx));
        drop(guard);
        assert!(task.await.unwrap());
    }

    #[tokio::test]
    async fn process_guard_finish_triggers_expiry() {
        let (guard, handle) = ProcessGuard::new();
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(await_expiry(Lifetime::ExternalProcess(handle), cancel_rx));
        guard.finish();
        assert!(task.await.unwrap());
    }
}
