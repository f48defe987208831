use std::sync::{
    atomic::{
        AtomicUsize,
        Ordering,
    },
    Arc,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Shared handle for stopping a run from the outside.
///
/// Graceful requests are counted, not latched, so that concurrent or
/// repeated requests can be told apart from the first one. An abort is a
/// latch and always wins.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug, Default)]
struct ShutdownInner {
    requests: AtomicUsize,
    notify: Notify,
    abort: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every running worker to stop and flush what it has. Returns the
    /// number of requests so far, including this one.
    pub fn request_graceful(&self) -> usize {
        let count = self.inner.requests.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.notify.notify_waiters();
        count
    }

    pub fn requests(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.requests() > 0
    }

    /// Kill everything and abandon the run.
    pub fn abort(&self) {
        self.inner.abort.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.abort.is_cancelled()
    }

    pub async fn aborted(&self) {
        self.inner.abort.cancelled().await;
    }

    /// Wait until more than `seen` graceful requests have been made and
    /// return the new count.
    pub async fn next_request(&self, seen: usize) -> usize {
        loop {
            let notified = self.inner.notify.notified();
            let current = self.requests();
            if current > seen {
                return current;
            }
            notified.await;
        }
    }
}
