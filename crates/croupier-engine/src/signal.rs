//! Manual-reset signal that can join a crossbeam `Select`.
//!
//! The flag is the source of truth; the bounded(1) token channel only
//! wakes a blocked waiter. Waiters always re-check flags after waking, so
//! a stale token costs one extra loop iteration and nothing else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

struct SignalInner {
    flag: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

/// Cloneable manual-reset signal. Clones share one flag.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    /// Create an unset signal.
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            inner: Arc::new(SignalInner {
                flag: AtomicBool::new(false),
                wake_tx,
                wake_rx,
            }),
        }
    }

    /// Set the flag and wake one blocked waiter.
    pub fn set(&self) {
        self.inner.flag.store(true, Ordering::Release);
        // Full means a wake-up is already pending.
        let _ = self.inner.wake_tx.try_send(());
    }

    /// Clear the flag and drop any pending wake-up.
    pub fn reset(&self) {
        self.inner.flag.store(false, Ordering::Release);
        while self.inner.wake_rx.try_recv().is_ok() {}
    }

    /// Current flag value.
    pub fn is_set(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Receiver that yields a token after [`set`](Self::set).
    pub(crate) fn waker(&self) -> &Receiver<()> {
        &self.inner.wake_rx
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("set", &self.is_set()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn set_and_reset() {
        let s = Signal::new();
        assert!(!s.is_set());
        s.set();
        s.set();
        assert!(s.is_set());
        assert!(s.waker().try_recv().is_ok());
        assert!(s.waker().try_recv().is_err());
        s.reset();
        assert!(!s.is_set());
    }

    #[test]
    fn reset_drains_pending_wakeup() {
        let s = Signal::new();
        s.set();
        s.reset();
        assert!(s.waker().try_recv().is_err());
    }

    #[test]
    fn set_from_another_thread_wakes_waiter() {
        let s = Signal::new();
        let setter = s.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            setter.set();
        });
        assert!(s.waker().recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(s.is_set());
        t.join().unwrap();
    }
}
