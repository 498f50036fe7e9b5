//! Lifecycle tracking for the background service tasks.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long a task gets to honor cancellation before it is abandoned.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Tracks named service tasks and cancels them together on shutdown.
pub struct TaskManager {
    tasks: HashMap<String, JoinHandle<Result<()>>>,
    pub global_token: CancellationToken,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns and registers a task under `name`.
    ///
    /// The task receives a child of the global cancellation token and is
    /// expected to return promptly once it is cancelled.
    pub fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.global_token.child_token();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {task_name}");
            match task_fn(token).await {
                Ok(()) => {
                    info!("Task '{task_name}' completed");
                    Ok(())
                }
                Err(e) => {
                    error!("Task '{task_name}' failed: {e}");
                    Err(e)
                }
            }
        });

        self.tasks.insert(name, handle);
    }

    /// Cancels every task and waits for completion.
    ///
    /// Collects failures and returns the first one; a task that ignores
    /// cancellation past [`SHUTDOWN_TIMEOUT`] counts as a failure.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());
        self.global_token.cancel();

        let mut first_error = None;
        for (name, handle) in self.tasks.drain() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!("Task '{name}' failed during shutdown: {e}");
                    first_error.get_or_insert(e);
                }
                Ok(Err(e)) => {
                    error!("Task '{name}' panicked: {e}");
                    first_error.get_or_insert(anyhow::anyhow!("task '{name}' panicked: {e}"));
                }
                Err(_) => {
                    error!("Task '{name}' ignored cancellation");
                    first_error
                        .get_or_insert(anyhow::anyhow!("task '{name}' shutdown timeout exceeded"));
                }
            }
        }

        match first_error {
            Some(e) => Err(e).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    #[cfg(test)]
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
