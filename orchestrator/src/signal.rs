use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

/// One-shot latch that any number of tasks can wait on.
///
/// Setting it is idempotent and waiting on a set signal returns at once.
#[derive(Debug, Clone, Default)]
pub struct Signal(CancellationToken);

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.cancel();
    }

    pub fn is_set(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn wait(&self) {
        self.0.cancelled().await;
    }

    /// Sets the signal when the guard is dropped, however the owner exits.
    pub fn set_on_drop(&self) -> DropGuard {
        self.0.clone().drop_guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn all_waiters_observe_the_signal() {
        let signal = Signal::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.wait().await })
            })
            .collect();
        assert!(!signal.is_set());
        signal.set();
        signal.set();
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        }
        assert!(signal.is_set());
        signal.wait().await;
    }

    #[tokio::test]
    async fn guard_sets_on_drop() {
        let signal = Signal::new();
        {
            let _guard = signal.set_on_drop();
            assert!(!signal.is_set());
        }
        assert!(signal.is_set());
    }
}
