use futures::future::{AbortHandle, Abortable};
use std::future::Future;
use tokio::task::JoinHandle;

/// Background work which can be cancelled, such as a heartbeat loop.
#[derive(Debug)]
pub struct Task {
    shutdown: AbortHandle,
    handle: JoinHandle<()>,
}

impl Task {
    /// Creates a new task and immediately runs it in a `tokio::task`.
    pub fn new<F>(task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, abort_registration) = AbortHandle::new_pair();
        let future = Abortable::new(task, abort_registration);
        let handle = tokio::task::spawn(async move {
            let _ = future.await;
        });

        Self { shutdown, handle }
    }

    /// Cancels the task and joins it.
    pub async fn cancel(self) {
        self.shutdown.abort();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[tokio::test]
    async fn cancel_after_completion_returns() {
        let task = Task::new(async {});
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.cancel().await;
    }

    #[tokio::test]
    async fn cancel_stops_endless_work() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let task = Task::new(async move {
            loop {
                counter.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        task.cancel().await;
        let after_cancel = ticks.load(Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::Relaxed), after_cancel);
    }
}
