// Queue Repository Port (Interface)

use crate::domain::{Queue, QueueId};
use crate::error::Result;
use async_trait::async_trait;

/// Storage version of a record; starts at 1 and grows by one per commit
pub type Version = u64;

/// A queue record together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedQueue {
    pub queue: Queue,
    pub version: Version,
}

/// Repository interface for queue record persistence.
///
/// Writes are version-checked: the store serializes commits per record and a
/// write only lands if the record is still at the version the caller read.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Load one record with its current version
    async fn load(&self, id: &QueueId) -> Result<Option<VersionedQueue>>;

    /// Load every record (ordered by created_at, then id)
    async fn load_all(&self) -> Result<Vec<VersionedQueue>>;

    /// Compare-and-swap a record location.
    ///
    /// * `expected` - `None` means "must be absent", `Some(v)` means "must be at v"
    /// * `next` - `Some` writes the record, `None` deletes it
    ///
    /// Returns the version of the committed state, or `None` when the location
    /// no longer matches `expected` (lost race, nothing written).
    async fn compare_and_swap(
        &self,
        id: &QueueId,
        expected: Option<Version>,
        next: Option<&Queue>,
    ) -> Result<Option<Version>>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, PoisonError};

    /// In-memory repository; a single mutex makes each CAS atomic
    #[derive(Default)]
    pub struct InMemoryQueueRepository {
        records: Mutex<HashMap<QueueId, VersionedQueue>>,
    }

    impl InMemoryQueueRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Store a record as-is, bypassing the version check (test fixtures)
        pub fn seed(&self, queue: Queue) -> Version {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            let version = records.get(&queue.id).map_or(1, |v| v.version + 1);
            records.insert(queue.id.clone(), VersionedQueue { queue, version });
            version
        }
    }

    #[async_trait]
    impl QueueRepository for InMemoryQueueRepository {
        async fn load(&self, id: &QueueId) -> Result<Option<VersionedQueue>> {
            let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(records.get(id).cloned())
        }

        async fn load_all(&self) -> Result<Vec<VersionedQueue>> {
            let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            let mut all: Vec<VersionedQueue> = records.values().cloned().collect();
            all.sort_by(|a, b| {
                a.queue
                    .created_at
                    .cmp(&b.queue.created_at)
                    .then_with(|| a.queue.id.cmp(&b.queue.id))
            });
            Ok(all)
        }

        async fn compare_and_swap(
            &self,
            id: &QueueId,
            expected: Option<Version>,
            next: Option<&Queue>,
        ) -> Result<Option<Version>> {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            let current = records.get(id).map(|v| v.version);
            if current != expected {
                return Ok(None);
            }

            let version = current.map_or(1, |v| v + 1);
            match next {
                Some(queue) => {
                    records.insert(
                        id.clone(),
                        VersionedQueue {
                            queue: queue.clone(),
                            version,
                        },
                    );
                    Ok(Some(version))
                }
                None if current.is_some() => {
                    records.remove(id);
                    Ok(Some(version))
                }
                None => Ok(Some(0)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::InMemoryQueueRepository;
    use super::*;

    fn queue(id: &str, created_at: i64) -> Queue {
        Queue::new(id, "Desk", 5, created_at).unwrap()
    }

    #[tokio::test]
    async fn test_insert_requires_absent() {
        let repo = InMemoryQueueRepository::new();
        let q = queue("q-1", 0);

        assert_eq!(repo.compare_and_swap(&q.id, None, Some(&q)).await.unwrap(), Some(1));
        assert_eq!(repo.compare_and_swap(&q.id, None, Some(&q)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_version_loses() {
        let repo = InMemoryQueueRepository::new();
        let mut q = queue("q-1", 0);
        repo.compare_and_swap(&q.id, None, Some(&q)).await.unwrap();

        q.admit("m-a", 1).unwrap();
        assert_eq!(repo.compare_and_swap(&q.id, Some(1), Some(&q)).await.unwrap(), Some(2));
        assert_eq!(repo.compare_and_swap(&q.id, Some(1), Some(&q)).await.unwrap(), None);

        let stored = repo.load(&q.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.queue.last_token, 1);
    }

    #[tokio::test]
    async fn test_delete_consumes_a_version() {
        let repo = InMemoryQueueRepository::new();
        let q = queue("q-1", 0);
        repo.compare_and_swap(&q.id, None, Some(&q)).await.unwrap();

        assert_eq!(repo.compare_and_swap(&q.id, Some(1), None).await.unwrap(), Some(2));
        assert!(repo.load(&q.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_all_is_ordered_by_creation() {
        let repo = InMemoryQueueRepository::new();
        repo.seed(queue("q-b", 20));
        repo.seed(queue("q-a", 10));
        repo.seed(queue("q-c", 20));

        let ids: Vec<_> = repo
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.queue.id)
            .collect();
        assert_eq!(ids, vec!["q-a", "q-b", "q-c"]);
    }
}
