//! Tracking of per-connection tasks.
//!
//! `SessionPool` hands every spawned session a numeric id and a child
//! of the pool's cancellation token, and can wait for all of them to
//! finish (wait-group semantics).

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub type SessionId = u64;

#[derive(Debug)]
pub struct SessionPool {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    next_id: SessionId,
}

impl SessionPool {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown,
            next_id: 1,
        }
    }

    /// Spawn a tracked task.
    ///
    /// `f` receives the session id and a token that is cancelled when
    /// the pool shuts down.
    pub fn spawn<F, Fut>(&mut self, f: F) -> SessionId
    where
        F: FnOnce(SessionId, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.tracker.spawn(f(id, self.shutdown.child_token()));
        id
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Stop accepting new tasks and wait for the running ones.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn ids_are_sequential() {
        let mut pool = SessionPool::new(CancellationToken::new());
        let a = pool.spawn(|_, _| async {});
        let b = pool.spawn(|_, _| async {});
        assert_eq!((a, b), (1, 2));
        pool.drain().await;
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn drain_waits_for_cancelled_tasks() {
        let shutdown = CancellationToken::new();
        let mut pool = SessionPool::new(shutdown.clone());
        let finished = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let finished = Arc::clone(&finished);
            pool.spawn(move |_, token| async move {
                token.cancelled().await;
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(pool.len(), 3);

        shutdown.cancel();
        pool.drain().await;
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert_eq!(pool.len(), 0);
    }
}
