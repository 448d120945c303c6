use std::future::Future;

use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

/// Detached work that must outlive the request which started it, such as the
/// producer behind a streamed chat reply. Tasks run on the runtime captured at
/// construction, not on the worker that accepted the request, and `drain`
/// waits for every one of them before shutdown.
#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    handle: Handle,
}

impl BackgroundTasks {
    pub fn new(handle: Handle) -> Self {
        Self {
            tracker: TaskTracker::new(),
            handle,
        }
    }

    /// Tracks tasks on the runtime of the caller. Panics outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(task, &self.handle);
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Closes the tracker and waits for every running task.
    pub async fn drain(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            log::info!("Waiting for {} background task(s) to finish", self.tracker.len());
        }
        self.tracker.wait().await;
    }
}
