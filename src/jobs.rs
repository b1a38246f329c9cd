// Dispatch of check tasks with a per-target in-flight guard.
use crate::check::CheckRunner;
use crate::model::{CheckOutcome, StorageError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A check for this target is still running; at most one writer may
    /// touch a target's chain at a time.
    #[error("check already in flight for target {0}")]
    AlreadyRunning(i64),
}

/// Handle on a dispatched check.
pub struct TaskHandle {
    pub target_id: i64,
    handle: JoinHandle<Result<CheckOutcome, StorageError>>,
}

impl TaskHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the check to complete. A panicked task is reported as a
    /// failed outcome rather than tearing down the caller.
    pub async fn wait(self) -> Result<CheckOutcome, StorageError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Ok(CheckOutcome::failure(format!("check task failed: {e}"))),
        }
    }
}

pub struct CheckQueue {
    runner: Arc<CheckRunner>,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl CheckQueue {
    pub fn new(runner: Arc<CheckRunner>) -> Self {
        Self {
            runner,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Spawns a check for the target unless one is already running.
    pub fn dispatch(&self, target_id: i64) -> Result<TaskHandle, DispatchError> {
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(target_id) {
                debug!("Skipping dispatch, target {target_id} already in flight");
                return Err(DispatchError::AlreadyRunning(target_id));
            }
        }

        let runner = self.runner.clone();
        let in_flight = self.in_flight.clone();
        let handle = tokio::spawn(async move {
            let result = runner.run_check(target_id).await;
            in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&target_id);
            result
        });

        Ok(TaskHandle { target_id, handle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::Fetcher;
    use crate::model::FetchError;
    use crate::storage::SqliteStorage;
    use crate::summary::SummaryGenerator;
    use async_trait::async_trait;

    /// Fetcher that parks until told to finish.
    struct GatedFetcher {
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl Fetcher for GatedFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            let _permit = self.gate.acquire().await.map_err(|_| FetchError::Timeout)?;
            Ok("<html><body><p>done</p></body></html>".to_string())
        }
    }

    fn queue(fetcher: Arc<dyn Fetcher>) -> (CheckQueue, i64) {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let target_id = storage.upsert_target("https://a.com", "A", None).unwrap().id;
        let runner = CheckRunner::new(
            Arc::new(tokio::sync::Mutex::new(storage)),
            fetcher,
            Arc::new(SummaryGenerator::new(None, 5)),
            None,
            std::env::temp_dir(),
        );
        (CheckQueue::new(Arc::new(runner)), target_id)
    }

    #[tokio::test]
    async fn second_dispatch_for_same_target_is_rejected() {
        let fetcher = Arc::new(GatedFetcher {
            gate: tokio::sync::Semaphore::new(0),
        });
        let (queue, target_id) = queue(fetcher.clone());

        let first = queue.dispatch(target_id).unwrap();
        assert!(matches!(
            queue.dispatch(target_id),
            Err(DispatchError::AlreadyRunning(id)) if id == target_id
        ));

        fetcher.gate.add_permits(1);
        let outcome = first.wait().await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn guard_clears_after_completion() {
        let fetcher = Arc::new(GatedFetcher {
            gate: tokio::sync::Semaphore::new(2),
        });
        let (queue, target_id) = queue(fetcher);

        let first = queue.dispatch(target_id).unwrap();
        first.wait().await.unwrap();

        // The task drops the guard before it resolves, so a fresh
        // dispatch must succeed.
        let second = queue.dispatch(target_id).unwrap();
        let outcome = second.wait().await.unwrap();
        assert!(outcome.success);
    }
}
