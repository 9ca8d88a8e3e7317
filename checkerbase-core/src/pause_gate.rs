use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A binary, awaitable, resettable gate controlling worker progress.
///
/// Initial state is "open". `pause()` resets the gate; `resume()` sets it and
/// wakes every waiter. It is safe to call either method with no waiters
/// present, and safe to reset the gate while a waiter is suspended in
/// [`PauseGate::wait_until_open`] — the check-then-await-notified sequence
/// below avoids the lost-wakeup race between the state flip and the
/// subscription to future notifications.
#[derive(Debug, Default)]
pub struct PauseGate {
    open: AtomicBool,
    notify: Notify,
}

impl PauseGate {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }

    pub fn pause(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Suspends the caller until the gate is open. Returns immediately if it
    /// already is.
    pub async fn wait_until_open(&self) {
        loop {
            if self.open.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.notify.notified();
            if self.open.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn open_gate_never_blocks() {
        let gate = PauseGate::new();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_until_open())
            .await
            .expect("open gate must not block");
    }

    #[tokio::test]
    async fn paused_gate_blocks_until_resume() {
        let gate = Arc::new(PauseGate::new());
        gate.pause();

        let waiter_gate = Arc::clone(&gate);
        let waiter = tokio::spawn(async move {
            waiter_gate.wait_until_open().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("resume must wake the waiter")
            .unwrap();
    }

    #[test]
    fn resume_without_waiters_does_not_panic() {
        let gate = PauseGate::new();
        gate.resume();
        gate.pause();
        gate.resume();
    }
}
