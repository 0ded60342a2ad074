use serde::Serialize;
use serde_json::Value as JsonValue;

/// A value that can be written to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int64(i64),
    Int32(i32),
    /// Unsigned 64-bit integer (stored as BIGINT)
    Uint64(u64),
    Text(String),
    /// Raw bytes (stored as BYTEA)
    Bytes(Vec<u8>),
    /// Numeric string for uint256/int256 (stored as NUMERIC)
    Numeric(String),
    /// Unix timestamp in seconds (stored as TIMESTAMPTZ)
    Timestamp(i64),
    Json(JsonValue),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Create a JSON value from any serializable type.
    pub fn json<T: Serialize>(value: T) -> Result<Self, serde_json::Error> {
        Ok(DbValue::Json(serde_json::to_value(value)?))
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<u64> for DbValue {
    fn from(v: u64) -> Self {
        DbValue::Uint64(v)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Int64(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Bool(v)
    }
}

/// Write operation buffered by handlers and applied when a block commits.
#[derive(Debug, Clone, PartialEq)]
pub enum DbOperation {
    /// INSERT with ON CONFLICT handling
    Upsert {
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
        /// Columns that form the unique constraint
        conflict_columns: Vec<String>,
        /// Columns to update on conflict; empty means DO NOTHING
        update_columns: Vec<String>,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
    },
    Update {
        table: String,
        set_columns: Vec<(String, DbValue)>,
        where_clause: WhereClause,
    },
    Delete {
        table: String,
        where_clause: WhereClause,
    },
    /// Raw SQL for complex operations (use sparingly)
    RawSql {
        query: String,
        params: Vec<DbValue>,
    },
}

impl DbOperation {
    pub fn table(&self) -> Option<&str> {
        match self {
            DbOperation::Upsert { table, .. }
            | DbOperation::Insert { table, .. }
            | DbOperation::Update { table, .. }
            | DbOperation::Delete { table, .. } => Some(table),
            DbOperation::RawSql { .. } => None,
        }
    }
}

/// WHERE clause for UPDATE and DELETE operations.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// column = value
    Eq(String, DbValue),
    /// column1 = value1 AND column2 = value2 AND ...
    And(Vec<(String, DbValue)>),
    /// Raw SQL condition with parameters
    Raw {
        condition: String,
        params: Vec<DbValue>,
    },
}
