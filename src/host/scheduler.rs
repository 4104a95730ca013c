//! Delayed calls on the tokio runtime.

use super::{Callback, CancelToken, Scheduler, TaskHandle};
use log::debug;
use std::time::Duration;
use tokio::runtime::Handle;

/// [`Scheduler`] that spawns a sleeping task per call.
///
/// Cancelling aborts the task; aborting a task that already finished is a
/// no-op.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Scheduler on the runtime of the calling task.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::from_handle(Handle::current())
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, callback: Callback) -> TaskHandle {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        let abort = task.abort_handle();
        CancelToken::new(move || {
            debug!("Cancelling scheduled call");
            abort.abort();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_after_runs_callback() {
        let scheduler = TokioScheduler::current();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let _handle = scheduler.after(
            Duration::from_millis(10),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        let fired = tokio::time::timeout(Duration::from_secs(2), rx).await;
        tokio_test::assert_ok!(tokio_test::assert_ok!(fired));
    }

    #[tokio::test]
    async fn test_cancel_prevents_callback() {
        let scheduler = TokioScheduler::current();
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        let handle = scheduler.after(
            Duration::from_millis(20),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
