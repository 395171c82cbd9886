//! `sqlx`-backed connection.

use std::fmt;
use std::str::FromStr;

use oxide_apply::{Connection, DriverError, DriverErrorKind, QueryResult, SqlValue};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row, Sqlite, Transaction, TypeInfo, ValueRef};
use tracing::debug;

use crate::error::driver_error;

/// A SQLite connection with at most one open transaction.
///
/// Statements run inside the open transaction when there is one, and on the
/// pool otherwise.
pub struct SqliteConnection {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("pool", &self.pool)
            .field("in_transaction", &self.tx.is_some())
            .finish()
    }
}

impl SqliteConnection {
    /// Opens `url` (`sqlite://path.db`, `sqlite::memory:`), creating the
    /// file if needed.
    ///
    /// The pool holds a single connection, so an in-memory database keeps
    /// its contents for the life of the session.
    ///
    /// # Errors
    ///
    /// Returns the classified driver error when the URL is invalid or the
    /// database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self, DriverError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(driver_error)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(driver_error)?;
        debug!(url = %url, "Connected to SQLite");
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool, tx: None }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether a transaction is open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub(crate) async fn fetch_rows<'q>(
        &mut self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Result<Vec<SqliteRow>, DriverError> {
        match self.tx {
            Some(ref mut tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        }
        .map_err(driver_error)
    }
}

fn bind_all<'q>(sql: &'q str, params: &'q [SqlValue]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params.iter().fold(sqlx::query(sql), |query, value| match value {
        SqlValue::Null => query.bind(None::<i64>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(n) => query.bind(*n),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.as_str()),
        SqlValue::Blob(b) => query.bind(b.as_slice()),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::Timestamp(ts) => query.bind(*ts),
    })
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    Ok(match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" => SqlValue::Int(row.try_get_unchecked(index)?),
        "BOOLEAN" => SqlValue::Bool(row.try_get_unchecked(index)?),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => SqlValue::Float(row.try_get_unchecked(index)?),
        "BLOB" => SqlValue::Blob(row.try_get_unchecked(index)?),
        _ => SqlValue::Text(row.try_get_unchecked(index)?),
    })
}

pub(crate) fn decode_rows(rows: &[SqliteRow]) -> Result<QueryResult, DriverError> {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| decode_value(row, i)).collect())
        .collect::<Result<Vec<Vec<SqlValue>>, sqlx::Error>>()
        .map_err(driver_error)?;
    Ok(QueryResult { columns, rows })
}

impl Connection for SqliteConnection {
    async fn begin(&mut self) -> Result<(), DriverError> {
        if self.tx.is_some() {
            return Err(DriverError::new(
                DriverErrorKind::Other,
                "a transaction is already open",
            ));
        }
        self.tx = Some(self.pool.begin().await.map_err(driver_error)?);
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        let query = bind_all(sql, params);
        let result = match self.tx {
            Some(ref mut tx) => query.execute(&mut **tx).await,
            None => query.execute(&self.pool).await,
        }
        .map_err(driver_error)?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DriverError> {
        let rows = self.fetch_rows(bind_all(sql, params)).await?;
        decode_rows(&rows)
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(driver_error),
            None => Err(DriverError::new(
                DriverErrorKind::Other,
                "no transaction to commit",
            )),
        }
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(driver_error),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        // Dropping an open transaction rolls it back.
        self.tx = None;
        self.pool.close().await;
        Ok(())
    }
}
