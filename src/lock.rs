//! Per-graph advisory lock: process-wide mutual exclusion on a
//! sentinel file within a graph directory. Acquisition blocks on
//! kernel-level `flock`; it is moved off the async executor with
//! `spawn_blocking`, matching the crate's convention of keeping
//! blocking I/O off the reactor.

use std::path::PathBuf;
use std::sync::Arc;

use fslock::LockFile;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task;

use crate::error::{Result, XdbiError};
use crate::layout::{Layout, MUTEX_FILE};

/// Zero-cost proof that the caller already holds the graph's lock.
/// Internal engine helpers (`_load`, `_add`, ...) take this instead of
/// reacquiring the lock themselves, so the type system — not a naming
/// convention alone — prevents re-entrant locking.
pub struct LockedGraph<'a> {
    _guard: &'a GraphLockGuard,
}

pub struct GraphLock {
    layout: Arc<Layout>,
}

impl GraphLock {
    pub fn new(layout: Arc<Layout>) -> Self {
        Self { layout }
    }

    /// Acquire the exclusive lock for `graph`, blocking the calling
    /// task until it succeeds. Failure to acquire is fatal for the
    /// operation (`XdbiError::LockFailure`).
    pub async fn acquire(&self, graph: &str) -> Result<GraphLockGuard> {
        let dir = self.layout.graph_dir(graph).await?;
        let path = dir.join(MUTEX_FILE);
        let graph_owned = graph.to_string();
        let path_for_blocking = path.clone();

        let file = task::spawn_blocking(move || -> std::result::Result<LockFile, std::io::Error> {
            let mut file = LockFile::open(&path_for_blocking)?;
            file.lock()?;
            Ok(file)
        })
        .await
        .expect("lock acquisition task panicked")
        .map_err(|source| XdbiError::LockFailure {
            graph: graph_owned.clone(),
            source,
        })?;

        Ok(GraphLockGuard {
            graph: graph_owned,
            path,
            file: AsyncMutex::new(Some(file)),
        })
    }
}

/// RAII scope guard: releases the advisory lock when dropped.
pub struct GraphLockGuard {
    graph: String,
    path: PathBuf,
    file: AsyncMutex<Option<LockFile>>,
}

impl GraphLockGuard {
    pub fn graph(&self) -> &str {
        &self.graph
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Borrow a token proving the lock is held, to pass into internal
    /// `_`-prefixed engine helpers.
    pub fn token(&self) -> LockedGraph<'_> {
        LockedGraph { _guard: self }
    }

    /// Explicitly release the lock before the guard goes out of scope.
    /// Safe to call more than once.
    pub async fn release(&self) {
        let mut slot = self.file.lock().await;
        if let Some(mut file) = slot.take() {
            let _ = file.unlock();
        }
    }
}

impl Drop for GraphLockGuard {
    fn drop(&mut self) {
        // `LockFile::unlock` is synchronous and best-effort; `LockFile`
        // also releases on its own `Drop`, so an explicit unlock here
        // is belt-and-suspenders against a caller holding the async
        // mutex guard across the drop.
        if let Ok(mut slot) = self.file.try_lock() {
            if let Some(mut file) = slot.take() {
                let _ = file.unlock();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn acquire_creates_sentinel_and_releases_on_drop() {
        let dir = tempdir().unwrap();
        let layout = Arc::new(Layout::new(dir.path()));
        let lock = GraphLock::new(layout.clone());

        {
            let guard = lock.acquire("g1").await.unwrap();
            assert_eq!(guard.graph(), "g1");
            assert!(guard.path().ends_with("g1/mutex_file"));
        }

        // Lock released on drop; a second acquisition must succeed.
        let guard2 = lock.acquire("g1").await.unwrap();
        drop(guard2);
    }

    #[tokio::test]
    async fn different_graphs_do_not_contend() {
        let dir = tempdir().unwrap();
        let layout = Arc::new(Layout::new(dir.path()));
        let lock = GraphLock::new(layout);

        let g1 = lock.acquire("g1").await.unwrap();
        let g2 = lock.acquire("g2").await.unwrap();
        drop(g1);
        drop(g2);
    }
}
