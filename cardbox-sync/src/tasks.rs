//! Named background task registry.
//!
//! Long-running loops (the notification publisher, per-client
//! streamers) are spawned through the registry so shutdown is
//! cooperative: each task receives a watch channel and is expected to
//! exit promptly once it reads `true`, running its own bookkeeping on
//! the way out. `stop` awaits the task, so callers observe completed
//! cleanup, not a detached abort.

use std::future::Future;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct NamedTask {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

/// Registry of named, cooperatively-stoppable background tasks.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, NamedTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a named task. Returns false without spawning when the
    /// name is already registered.
    pub fn spawn<F, Fut>(&self, name: &str, task: F) -> bool
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.tasks.contains_key(name) {
            warn!(task = name, "task already running, not spawning");
            return false;
        }
        let (stop, shutdown) = watch::channel(false);
        let handle = tokio::spawn(task(shutdown));
        self.tasks
            .insert(name.to_string(), NamedTask { handle, stop });
        debug!(task = name, "spawned background task");
        true
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks
            .get(name)
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Signal one task to stop and wait for it to finish.
    ///
    /// Returns false when no task with that name is registered.
    pub async fn stop(&self, name: &str) -> bool {
        let Some((_, task)) = self.tasks.remove(name) else {
            return false;
        };
        // A closed receiver just means the task already exited.
        let _ = task.stop.send(true);
        if let Err(e) = task.handle.await {
            warn!(task = name, error = %e, "background task panicked");
        }
        debug!(task = name, "stopped background task");
        true
    }

    /// Stop every registered task.
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.stop(&name).await;
        }
    }
}
