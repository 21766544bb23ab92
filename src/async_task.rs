// ============================================================================
// File: src/async_task.rs
// ----------------------------------------------------------------------------
// Spawned-task plumbing shared by backends, fabrics and the orchestrator.
//
// Trait methods hand back an `AsyncTask<T>` (a tokio join handle) instead of
// being `async fn`, which keeps the backend and fabric traits object-safe.
// ============================================================================

use std::future::Future;

/// Handle to a spawned unit of work.
pub type AsyncTask<T> = tokio::task::JoinHandle<T>;

/// Small builder around `tokio::spawn` so call sites read uniformly.
pub struct AsyncTaskBuilder<F> {
    future: F,
}

impl<F> AsyncTaskBuilder<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    pub fn new(future: F) -> Self {
        Self { future }
    }

    /// Spawn onto the current tokio runtime.
    pub fn spawn(self) -> AsyncTask<F::Output> {
        tokio::spawn(self.future)
    }
}

/// Resolve a task that already returns a value, folding a join failure
/// (panic or runtime shutdown) into the caller's error type.
pub async fn join_or<T, E>(task: AsyncTask<Result<T, E>>, on_join: impl FnOnce(String) -> E) -> Result<T, E> {
    match task.await {
        Ok(result) => result,
        Err(join_error) => Err(on_join(join_error.to_string())),
    }
}
