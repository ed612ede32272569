use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Cooperatively cancellable task owned by a driver. [`TaskHandle::cancel`]
/// requests stop; [`TaskHandle::join`] waits until the task has observed
/// cancellation and exited
pub struct TaskHandle {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `f`, handing it the token it is expected to watch
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(f(cancel.clone()));
        Self { cancel, handle }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            log::error!("Error joining driver task {e:}");
        }
    }
}
