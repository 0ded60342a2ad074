use std::path::Path;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_postgres::NoTls;

use super::error::DbError;
use super::sql::Statement;
use super::store::Store;
use super::types::{DbOperation, DbValue};

/// Single-row table holding the committed height.
pub(crate) const STATUS_TABLE: &str = "_processor_status";

/// PostgreSQL-backed [`Store`]. Each block's operations and the new committed
/// height are written in one database transaction.
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub async fn new(database_url: &str, max_connections: usize) -> Result<Self, DbError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| DbError::InvalidConnectionString(e.to_string()))?;

        let manager = Manager::from_config(
            config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let pool = Pool::builder(manager)
            .max_size(max_connections)
            .runtime(Runtime::Tokio1)
            .build()?;

        let _conn = pool.get().await?;
        tracing::info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self, dir: &Path) -> Result<(), DbError> {
        super::migrations::run(&self.pool, dir).await
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn last_committed(&self) -> Result<Option<u64>, DbError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT height FROM {} WHERE id = 0", STATUS_TABLE),
                &[],
            )
            .await?;

        Ok(row.map(|r| r.get::<_, i64>(0) as u64))
    }

    async fn transact(
        &self,
        from: u64,
        to: u64,
        operations: Vec<DbOperation>,
    ) -> Result<(), DbError> {
        let to_height = i64::try_from(to).map_err(|_| DbError::HeightOverflow(to))?;

        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        let committed = transaction
            .query_opt(
                &format!("SELECT height FROM {} WHERE id = 0 FOR UPDATE", STATUS_TABLE),
                &[],
            )
            .await?
            .map(|r| r.get::<_, i64>(0));

        if let Some(committed) = committed {
            if committed >= 0 && committed as u64 >= from {
                return Err(DbError::WatermarkConflict {
                    committed: committed as u64,
                    from,
                    to,
                });
            }
        }

        for op in &operations {
            let stmt = Statement::from(op);
            let params: Vec<SqlParam> = stmt.params.iter().map(SqlParam::from).collect();
            let params_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

            if let Err(e) = transaction.execute(&stmt.sql, &params_refs[..]).await {
                let db_err: DbError = e.into();
                tracing::error!("SQL execution failed\n  SQL: {}\n  Error: {}", stmt.sql, db_err);
                return Err(db_err);
            }
        }

        transaction
            .execute(
                &format!(
                    "INSERT INTO {} (id, height) VALUES (0, $1) \
                     ON CONFLICT (id) DO UPDATE SET height = EXCLUDED.height",
                    STATUS_TABLE
                ),
                &[&to_height],
            )
            .await?;

        transaction.commit().await?;

        tracing::trace!(
            "Committed blocks {}-{} with {} operations",
            from,
            to,
            operations.len()
        );
        Ok(())
    }
}

#[derive(Debug)]
enum SqlParam {
    Null,
    Bool(bool),
    Int64(i64),
    Int32(i32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl From<&DbValue> for SqlParam {
    fn from(value: &DbValue) -> Self {
        match value {
            DbValue::Null => SqlParam::Null,
            DbValue::Bool(v) => SqlParam::Bool(*v),
            DbValue::Int64(v) => SqlParam::Int64(*v),
            DbValue::Int32(v) => SqlParam::Int32(*v),
            DbValue::Uint64(v) => match i64::try_from(*v) {
                Ok(v) => SqlParam::Int64(v),
                Err(_) => SqlParam::Text(v.to_string()),
            },
            DbValue::Text(v) => SqlParam::Text(v.clone()),
            DbValue::Bytes(v) => SqlParam::Bytes(v.clone()),
            DbValue::Numeric(v) => SqlParam::Text(v.clone()),
            DbValue::Timestamp(v) => SqlParam::Float64(*v as f64),
            DbValue::Json(v) => SqlParam::Json(v.clone()),
        }
    }
}

impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlParam::Null => Ok(IsNull::Yes),
            SqlParam::Bool(v) => v.to_sql(ty, out),
            SqlParam::Int64(v) => v.to_sql(ty, out),
            SqlParam::Int32(v) => v.to_sql(ty, out),
            SqlParam::Float64(v) => v.to_sql(ty, out),
            SqlParam::Text(v) => v.to_sql(ty, out),
            SqlParam::Bytes(v) => v.to_sql(ty, out),
            SqlParam::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <bool as ToSql>::accepts(ty)
            || <i64 as ToSql>::accepts(ty)
            || <i32 as ToSql>::accepts(ty)
            || <f64 as ToSql>::accepts(ty)
            || <String as ToSql>::accepts(ty)
            || <Vec<u8> as ToSql>::accepts(ty)
            || <serde_json::Value as ToSql>::accepts(ty)
    }

    tokio_postgres::types::to_sql_checked!();
}
