//! A fixed-size pool of store handles.

use deadpool::unmanaged::{Object, Pool};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{DbError, DbResult, RetryPolicy, Store};

/// A checked-out store handle. Dropping it returns the handle to its pool.
pub type PooledStore = Object<Store>;

/// Pre-opened [`Store`] handles shared by the daemon's tasks.
///
/// Each handle is used by one caller at a time. Checkout suspends while
/// every handle is in use.
#[derive(Clone)]
pub struct StorePool {
    pool: Pool<Store>,
    path: PathBuf,
    capacity: usize,
}

impl std::fmt::Debug for StorePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePool")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl StorePool {
    /// Open `size` handles on the database at `path`.
    pub fn open(path: &Path, size: usize, retry: RetryPolicy) -> DbResult<Self> {
        if size == 0 {
            return Err(DbError::Pool("pool size must be at least 1".to_string()));
        }

        let stores = (0..size)
            .map(|_| Store::open(path, retry))
            .collect::<DbResult<Vec<_>>>()?;

        info!(path = %path.display(), size, "Opened store pool");
        Ok(Self {
            pool: Pool::from(stores),
            path: path.to_path_buf(),
            capacity: size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check out a handle, waiting until one is free.
    pub async fn get(&self) -> DbResult<PooledStore> {
        self.pool
            .get()
            .await
            .map_err(|e| DbError::Pool(e.to_string()))
    }

    /// Return a handle to the pool.
    pub fn put(&self, store: PooledStore) {
        drop(store);
    }

    /// Run a synchronous store operation on the blocking thread pool.
    ///
    /// The handle is checked out for the duration of `f` and returned on
    /// every exit path, including a panic inside `f`.
    pub async fn run<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Store) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut store = self.get().await?;
        tokio::task::spawn_blocking(move || f(&mut store)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobq_core::{Job, JobOptions};
    use std::time::Duration;

    fn open_pool(dir: &tempfile::TempDir, size: usize) -> StorePool {
        StorePool::open(&dir.path().join("jobq.db"), size, RetryPolicy::default()).unwrap()
    }

    #[test]
    fn test_zero_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = StorePool::open(&dir.path().join("jobq.db"), 0, RetryPolicy::default());
        assert!(matches!(result, Err(DbError::Pool(_))));
    }

    #[tokio::test]
    async fn test_get_blocks_when_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir, 2);

        let first = pool.get().await.unwrap();
        let _second = pool.get().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.get()).await;
        assert!(blocked.is_err(), "checkout should wait while exhausted");

        pool.put(first);
        let third = tokio::time::timeout(Duration::from_secs(1), pool.get()).await;
        assert!(third.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_run_returns_handle() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir, 1);

        for _ in 0..3 {
            let count = pool.run(|store| Ok(store.get_all()?.len())).await.unwrap();
            assert_eq!(count, 0);
        }

        let failed: DbResult<()> = pool
            .run(|_| Err(DbError::InvalidData("boom".to_string())))
            .await;
        assert!(failed.is_err());
        assert!(pool.get().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir, 4);

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    pool.run(move |store| {
                        let mut job =
                            Job::new(vec!["echo".to_string(), i.to_string()], JobOptions::default())
                                .map_err(|e| DbError::InvalidData(e.to_string()))?;
                        store.submit(&mut job)
                    })
                    .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 32);
        assert!(ids.iter().all(|id| id.is_assigned()));

        let stored = pool.run(|store| store.get_all()).await.unwrap();
        let mut stored_ids: Vec<_> = stored.iter().map(|j| j.id).collect();
        stored_ids.sort();
        assert_eq!(stored_ids, ids);
        for pair in stored.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
    }
}
