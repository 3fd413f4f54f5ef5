use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::TransferError;

/// Pause point between chunks.
///
/// Pausing only sets a flag; traversals observe it the next time they reach
/// [`wait`](Self::wait). Unpausing clears the flag and releases every waiter
/// parked at that moment. Waiters register before reading the flag, so an
/// unpause racing with a waiter is never lost.
#[derive(Debug, Default)]
pub struct PauseGate {
    paused: AtomicBool,
    waiting: AtomicUsize,
    notify: Notify,
    cancel: CancellationToken,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn unpause(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Pauses permanently: current and future waiters fail with
    /// [`TransferError::Cancelled`].
    pub fn cancel(&self) {
        self.pause();
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of traversals currently parked at the gate.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Token cancelled by [`cancel`](Self::cancel).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns immediately unless paused; otherwise parks until the next
    /// unpause or cancellation.
    pub async fn wait(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if !self.is_paused() {
            return Ok(());
        }

        self.waiting.fetch_add(1, Ordering::SeqCst);
        let result = tokio::select! {
            _ = &mut notified => Ok(()),
            _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
        };
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
