//! Per-request fork-join group.
//!
//! Sub-tasks run on the tokio runtime and share a cancellation token that
//! is a child of the request's token. The first failing sub-task cancels
//! that shared token so its siblings can stop early. Nothing is ever
//! force-stopped: dropping the group detaches whatever is still running.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// A bounded set of sub-tasks joinable to a single result.
///
/// # Example
///
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use trellis_core::TaskGroup;
///
/// # tokio_test::block_on(async {
/// let mut group = TaskGroup::new(&CancellationToken::new());
/// group.set_limit(Some(2)).unwrap();
/// group.spawn(async { Ok(()) }).await;
/// assert!(group.wait().await.is_ok());
/// # });
/// ```
#[derive(Debug)]
pub struct TaskGroup {
    tasks: JoinSet<Result<(), Error>>,
    limit: Option<(usize, Arc<Semaphore>)>,
    token: CancellationToken,
}

impl TaskGroup {
    /// Creates a group whose token is a child of `parent`.
    #[must_use]
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            limit: None,
            token: parent.child_token(),
        }
    }

    /// Returns the token shared by all sub-tasks.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Caps the number of sub-tasks running at once. `None` removes the cap.
    ///
    /// # Errors
    ///
    /// Fails while any sub-task is still unjoined, since those hold permits
    /// of the previous cap.
    pub fn set_limit(&mut self, limit: Option<usize>) -> Result<(), Error> {
        if !self.tasks.is_empty() {
            return Err(Error::handler(format!(
                "cannot change task limit while {} sub-tasks are active",
                self.tasks.len()
            )));
        }
        self.limit = limit.map(|n| (n, Arc::new(Semaphore::new(n))));
        Ok(())
    }

    /// Returns the configured cap.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit.as_ref().map(|(n, _)| *n)
    }

    /// Starts `task`, waiting for a free slot if the cap is reached.
    pub async fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let permit = match &self.limit {
            Some((_, semaphore)) => Arc::clone(semaphore).acquire_owned().await.ok(),
            None => None,
        };
        self.start(task, permit);
    }

    /// Starts `task` only if a slot is free. Returns false otherwise.
    pub fn try_spawn<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let permit = match &self.limit {
            Some((_, semaphore)) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => return false,
            },
            None => None,
        };
        self.start(task, permit);
        true
    }

    fn start<F>(&mut self, task: F, permit: Option<tokio::sync::OwnedSemaphorePermit>)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let token = self.token.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            let result = task.await;
            if result.is_err() {
                token.cancel();
            }
            result
        });
    }

    /// Waits for every sub-task and returns the first failure, if any.
    pub async fn wait(&mut self) -> Result<(), Error> {
        let mut first = None;
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(join_err) if join_err.is_cancelled() => Err(Error::Cancelled),
                Err(join_err) => Err(Error::handler(format!("sub-task panicked: {join_err}"))),
            };
            if let Err(err) = outcome {
                if first.is_none() {
                    first = Some(Error::SubTask(Box::new(err)));
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Returns the number of sub-tasks not yet joined.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no sub-task is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.tasks.detach_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_all_success() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new(&CancellationToken::new());

        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            group
                .spawn(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
        }

        assert!(group.wait().await.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn test_first_error_cancels_siblings() {
        let mut group = TaskGroup::new(&CancellationToken::new());
        let token = group.token();

        group
            .spawn(async { Err(Error::handler("fetch failed")) })
            .await;
        group
            .spawn(async move {
                token.cancelled().await;
                Ok(())
            })
            .await;

        let err = group.wait().await.unwrap_err();
        assert_eq!(err.to_string(), "sub-task failed: fetch failed");
        assert!(group.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_try_spawn_respects_limit() {
        let mut group = TaskGroup::new(&CancellationToken::new());
        group.set_limit(Some(1)).unwrap();
        assert_eq!(group.limit(), Some(1));
        let gate = CancellationToken::new();
        let release = gate.clone();

        assert!(group.try_spawn(async move {
            gate.cancelled().await;
            Ok(())
        }));
        assert!(!group.try_spawn(async { Ok(()) }));

        release.cancel();
        assert!(group.wait().await.is_ok());
        assert!(group.try_spawn(async { Ok(()) }));
        assert!(group.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_spawn_blocks_until_slot_frees() {
        let mut group = TaskGroup::new(&CancellationToken::new());
        group.set_limit(Some(1)).unwrap();

        group
            .spawn(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            })
            .await;
        // Waits for the first task's permit.
        group.spawn(async { Ok(()) }).await;

        assert!(group.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_set_limit_refused_while_tasks_active() {
        let mut group = TaskGroup::new(&CancellationToken::new());
        group.set_limit(Some(3)).unwrap();
        let gate = CancellationToken::new();

        for _ in 0..3 {
            let gate = gate.clone();
            assert!(group.try_spawn(async move {
                gate.cancelled().await;
                Ok(())
            }));
        }

        let err = group.set_limit(Some(1)).unwrap_err();
        assert!(err.to_string().contains("3 sub-tasks are active"));
        assert_eq!(group.limit(), Some(3));
        assert!(!group.try_spawn(async { Ok(()) }));

        gate.cancel();
        assert!(group.wait().await.is_ok());
        group.set_limit(Some(1)).unwrap();
        assert_eq!(group.limit(), Some(1));
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_tasks() {
        let parent = CancellationToken::new();
        let mut group = TaskGroup::new(&parent);
        let token = group.token();

        group
            .spawn(async move {
                token.cancelled().await;
                Ok(())
            })
            .await;
        parent.cancel();

        assert!(group.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let mut group = TaskGroup::new(&CancellationToken::new());
        let explode = true;
        group
            .spawn(async move {
                if explode {
                    panic!("boom");
                }
                Ok(())
            })
            .await;

        let err = group.wait().await.unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn test_drop_detaches_running_tasks() {
        let done = Arc::new(AtomicUsize::new(0));
        {
            let mut group = TaskGroup::new(&CancellationToken::new());
            let done = Arc::clone(&done);
            group
                .spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
