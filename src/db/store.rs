//! The store interface consumed by the processor.
//!
//! Handlers never write to the store directly. They buffer [`DbOperation`]s in
//! a [`StoreTransaction`] while a block is processed; the processor hands the
//! buffer to [`Store::transact`] only if every handler succeeded, so a failing
//! block leaves no trace.

use async_trait::async_trait;

use super::error::DbError;
use super::types::{DbOperation, DbValue, WhereClause};

/// Transactional, height-keyed persistence.
#[async_trait]
pub trait Store: Send + Sync {
    /// Highest committed block height, if anything has been committed.
    async fn last_committed(&self) -> Result<Option<u64>, DbError>;

    /// Apply `operations` for blocks `from..=to` and advance the committed
    /// height to `to`, atomically. Nothing is applied if any step fails.
    async fn transact(
        &self,
        from: u64,
        to: u64,
        operations: Vec<DbOperation>,
    ) -> Result<(), DbError>;
}

/// Write operations buffered for the block being processed.
#[derive(Debug, Default)]
pub struct StoreTransaction {
    operations: Vec<DbOperation>,
}

impl StoreTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: DbOperation) {
        self.operations.push(op);
    }

    pub fn insert(&mut self, table: &str, columns: &[&str], values: Vec<DbValue>) {
        self.push(DbOperation::Insert {
            table: table.to_string(),
            columns: to_strings(columns),
            values,
        });
    }

    pub fn upsert(
        &mut self,
        table: &str,
        columns: &[&str],
        values: Vec<DbValue>,
        conflict_columns: &[&str],
        update_columns: &[&str],
    ) {
        self.push(DbOperation::Upsert {
            table: table.to_string(),
            columns: to_strings(columns),
            values,
            conflict_columns: to_strings(conflict_columns),
            update_columns: to_strings(update_columns),
        });
    }

    pub fn update(&mut self, table: &str, set_columns: Vec<(String, DbValue)>, where_clause: WhereClause) {
        self.push(DbOperation::Update {
            table: table.to_string(),
            set_columns,
            where_clause,
        });
    }

    pub fn delete(&mut self, table: &str, where_clause: WhereClause) {
        self.push(DbOperation::Delete {
            table: table.to_string(),
            where_clause,
        });
    }

    pub fn operations(&self) -> &[DbOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn into_operations(self) -> Vec<DbOperation> {
        self.operations
    }
}

fn to_strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
