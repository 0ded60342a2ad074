//! In-memory [`Store`] for tests and dry runs.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::error::DbError;
use super::store::Store;
use super::types::DbOperation;

/// One successful [`Store::transact`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub from: u64,
    pub to: u64,
    pub operations: Vec<DbOperation>,
}

#[derive(Debug, Default)]
struct MemoryState {
    height: Option<u64>,
    commits: Vec<Commit>,
}

/// Keeps every commit in memory. Applies the same watermark rule as the
/// PostgreSQL store: a commit must start above the committed height.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already committed everything up to `height`.
    pub fn at_height(height: u64) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                height: Some(height),
                commits: Vec::new(),
            }),
        }
    }

    pub async fn commits(&self) -> Vec<Commit> {
        self.state.lock().await.commits.clone()
    }

    pub async fn operations(&self) -> Vec<DbOperation> {
        self.state
            .lock()
            .await
            .commits
            .iter()
            .flat_map(|c| c.operations.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn last_committed(&self) -> Result<Option<u64>, DbError> {
        Ok(self.state.lock().await.height)
    }

    async fn transact(
        &self,
        from: u64,
        to: u64,
        operations: Vec<DbOperation>,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;

        if let Some(committed) = state.height {
            if committed >= from {
                return Err(DbError::WatermarkConflict {
                    committed,
                    from,
                    to,
                });
            }
        }

        tracing::trace!(
            "Committed blocks {}-{} with {} operations in memory",
            from,
            to,
            operations.len()
        );

        state.height = Some(to);
        state.commits.push(Commit {
            from,
            to,
            operations,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbValue;

    #[tokio::test]
    async fn test_commit_advances_height() {
        let store = MemoryStore::new();
        assert_eq!(store.last_committed().await.unwrap(), None);

        let op = DbOperation::RawSql {
            query: "SELECT 1".to_string(),
            params: vec![DbValue::Null],
        };
        store.transact(5, 5, vec![op.clone()]).await.unwrap();

        assert_eq!(store.last_committed().await.unwrap(), Some(5));
        assert_eq!(store.operations().await, vec![op]);
    }

    #[tokio::test]
    async fn test_rejects_commit_at_or_below_height() {
        let store = MemoryStore::at_height(10);

        let err = store.transact(10, 10, vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::WatermarkConflict {
                committed: 10,
                from: 10,
                ..
            }
        ));
        assert!(store.commits().await.is_empty());

        store.transact(11, 11, vec![]).await.unwrap();
        assert_eq!(store.last_committed().await.unwrap(), Some(11));
    }
}
