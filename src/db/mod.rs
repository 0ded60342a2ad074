pub mod error;
pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod sql;
pub mod store;
pub mod types;

pub use error::DbError;
pub use memory::{Commit, MemoryStore};
pub use postgres::PostgresStore;
pub use store::{Store, StoreTransaction};
pub use types::{DbOperation, DbValue, WhereClause};
