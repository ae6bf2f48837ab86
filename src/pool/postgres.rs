//! PostgreSQL pools backed by sqlx.
//!
//! Pools connect lazily, so building a router never blocks on the network;
//! the initial health check is what first reaches each node.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::{Column, Either, Postgres, Row as _, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::Duration;

use crate::config::NodeConfig;
use crate::error::DbError;
use crate::pool::value::{QueryResult, SqlValue};
use crate::pool::{Connection, ConnectionPool, PoolFactory, PoolStats, PooledConnection};

/// Creates one sqlx `PgPool` per node.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgPoolFactory;

impl PoolFactory for PgPoolFactory {
    fn create(&self, config: &NodeConfig) -> Result<Arc<dyn ConnectionPool>, DbError> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .ssl_mode(if config.tls {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            });
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .idle_timeout(config.idle_timeout())
            .acquire_timeout(config.connect_timeout())
            .connect_lazy_with(options);

        Ok(Arc::new(PgConnectionPool::new(pool, config.connect_timeout())))
    }
}

/// Adapter from a sqlx pool to [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct PgConnectionPool {
    pool: PgPool,
    acquire_timeout: Duration,
}

impl PgConnectionPool {
    pub fn new(pool: PgPool, acquire_timeout: Duration) -> Self {
        Self {
            pool,
            acquire_timeout,
        }
    }
}

#[async_trait]
impl ConnectionPool for PgConnectionPool {
    async fn acquire(&self) -> Result<PooledConnection, DbError> {
        let conn = self.pool.acquire().await.map_err(|err| match err {
            sqlx::Error::PoolTimedOut => DbError::Timeout(self.acquire_timeout),
            sqlx::Error::PoolClosed => DbError::PoolClosed,
            other => DbError::Driver(other),
        })?;
        Ok(Box::new(PgPooledConnection { conn }))
    }

    fn stats(&self) -> PoolStats {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        PoolStats {
            size,
            idle,
            borrowed: size.saturating_sub(idle),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

struct PgPooledConnection {
    conn: PoolConnection<Postgres>,
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        // Untyped NULLs go out as text; Postgres coerces them for most columns.
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

fn decode_column(row: &PgRow, index: usize) -> Result<SqlValue, DbError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => SqlValue::Bool(row.try_get(index)?),
        "INT2" => SqlValue::Int(row.try_get::<i16, _>(index)?.into()),
        "INT4" => SqlValue::Int(row.try_get::<i32, _>(index)?.into()),
        "INT8" => SqlValue::Int(row.try_get(index)?),
        "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => SqlValue::Float(row.try_get(index)?),
        "BYTEA" => SqlValue::Bytes(row.try_get(index)?),
        "TIMESTAMPTZ" => {
            let ts: chrono::DateTime<chrono::Utc> = row.try_get(index)?;
            SqlValue::Text(ts.to_rfc3339())
        }
        "TIMESTAMP" => {
            let ts: chrono::NaiveDateTime = row.try_get(index)?;
            SqlValue::Text(ts.to_string())
        }
        _ => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) => SqlValue::Text(text),
            Err(_) => {
                return Err(DbError::Query(format!(
                    "unsupported column type {} for column {}",
                    type_name,
                    row.column(index).name()
                )))
            }
        },
    };
    Ok(value)
}

#[async_trait]
impl Connection for PgPooledConnection {
    #[allow(deprecated)]
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DbError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();
        let mut rows_affected = 0;

        let mut stream = query.fetch_many(&mut *self.conn);
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => rows_affected += done.rows_affected(),
                Either::Right(row) => {
                    if columns.is_empty() {
                        columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    let values = (0..row.len())
                        .map(|i| decode_column(&row, i))
                        .collect::<Result<Vec<_>, _>>()?;
                    rows.push(values);
                }
            }
        }

        Ok(QueryResult::from_rows(columns, rows, rows_affected))
    }

    fn discard(&mut self) {
        self.conn.close_on_drop();
    }
}
