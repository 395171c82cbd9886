//! Transaction executor.
//!
//! Runs a [`CompiledBatch`] against a [`Connection`]: begin, run every
//! statement in order, commit. Any failure rolls back and surfaces the
//! classified error together with the failing statement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compiler::{CompiledBatch, CompiledStatement, StatementOrigin};
use crate::error::{ApplyError, DriverError, Result};
use crate::value::SqlValue;

/// Rows returned by [`Connection::query`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    /// Column names, in select order.
    pub columns: Vec<String>,
    /// Rows, each with one value per column.
    pub rows: Vec<Vec<SqlValue>>,
}

/// A live database connection.
///
/// Implementations hold at most one open transaction. `execute` and
/// `query` run inside it when one is open.
#[allow(async_fn_in_trait)]
pub trait Connection {
    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Fails when a transaction is already open or the engine refuses.
    async fn begin(&mut self) -> std::result::Result<(), DriverError>;

    /// Runs a statement and returns the number of rows it affected.
    ///
    /// # Errors
    ///
    /// Returns the engine's error for the statement.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<u64, DriverError>;

    /// Runs a statement and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns the engine's error for the statement.
    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<QueryResult, DriverError>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Fails when no transaction is open or the engine refuses.
    async fn commit(&mut self) -> std::result::Result<(), DriverError>;

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the engine's error, if any.
    async fn rollback(&mut self) -> std::result::Result<(), DriverError>;

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns the engine's error, if any.
    async fn close(&mut self) -> std::result::Result<(), DriverError>;
}

/// Requests cancellation of a running batch from another task.
///
/// The executor checks the handle before every statement.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates a handle that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a previous request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Rows affected by one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementRows {
    /// Producing op.
    pub origin: StatementOrigin,
    /// Rows affected.
    pub rows: u64,
    /// Whether the statement addressed one row by key.
    pub keyed: bool,
}

/// Outcome of a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Rows affected, one entry per statement in execution order.
    pub rows_affected: Vec<StatementRows>,
    /// Whether the work is durable.
    pub committed: bool,
}

impl ExecutionResult {
    /// Total rows affected.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.rows_affected.iter().map(|r| r.rows).sum()
    }

    /// Rows affected by the op at `origin`.
    #[must_use]
    pub fn rows_for(&self, origin: StatementOrigin) -> u64 {
        self.rows_affected
            .iter()
            .filter(|r| r.origin == origin)
            .map(|r| r.rows)
            .sum()
    }

    /// Keyed updates and deletes that matched no row.
    pub fn unmatched(&self) -> impl Iterator<Item = StatementOrigin> + '_ {
        self.rows_affected
            .iter()
            .filter(|r| r.keyed && r.rows == 0)
            .map(|r| r.origin)
    }
}

/// Runs compiled batches.
#[derive(Debug, Clone, Default)]
pub struct TransactionExecutor {
    cancel: CancelHandle,
}

impl TransactionExecutor {
    /// Creates an executor with its own cancel handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor observing `cancel`.
    #[must_use]
    pub const fn with_cancel(cancel: CancelHandle) -> Self {
        Self { cancel }
    }

    /// Handle that cancels batches run by this executor.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Runs `batch` on `conn`.
    ///
    /// Transactional batches either commit completely or leave the
    /// database untouched. Non-transactional batches (DDL on engines
    /// without transactional DDL) stop at the first failure.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` when the handle fires between statements,
    /// `AmbiguousTarget` when a keyed statement touches several rows, and the
    /// classified driver error, with its statement index, otherwise.
    pub async fn execute<C: Connection>(
        &self,
        conn: &mut C,
        batch: &CompiledBatch,
    ) -> Result<ExecutionResult> {
        if batch.is_empty() {
            return Ok(ExecutionResult {
                rows_affected: Vec::new(),
                committed: true,
            });
        }

        info!(
            statements = batch.len(),
            transactional = batch.transactional,
            "Applying batch"
        );

        if batch.transactional {
            conn.begin()
                .await
                .map_err(|e| ApplyError::from_driver(0, "BEGIN", e))?;
        }

        let mut rows_affected = Vec::with_capacity(batch.len());
        for (index, stmt) in batch.statements.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(index, "Batch cancelled");
                if batch.transactional {
                    rollback(conn).await;
                }
                return Err(ApplyError::Cancelled { index });
            }

            match Self::run_statement(conn, index, stmt).await {
                Ok(rows) => rows_affected.push(StatementRows {
                    origin: stmt.origin,
                    rows,
                    keyed: stmt.expects_single_row(),
                }),
                Err(err) => {
                    warn!(index, error = %err, "Statement failed");
                    if batch.transactional {
                        rollback(conn).await;
                    }
                    return Err(err);
                }
            }
        }

        if batch.transactional {
            if let Err(e) = conn.commit().await {
                warn!(error = %e, "Commit failed");
                rollback(conn).await;
                return Err(ApplyError::from_driver(batch.len(), "COMMIT", e));
            }
        }

        let result = ExecutionResult {
            rows_affected,
            committed: true,
        };
        info!(rows = result.total_rows(), "Batch applied successfully");
        Ok(result)
    }

    async fn run_statement<C: Connection>(
        conn: &mut C,
        index: usize,
        stmt: &CompiledStatement,
    ) -> Result<u64> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "Executing SQL");
        let rows = conn
            .execute(&stmt.sql, &stmt.params)
            .await
            .map_err(|e| ApplyError::from_driver(index, &stmt.sql, e))?;

        if let Some(ref columns) = stmt.key_columns {
            if rows > 1 {
                return Err(ApplyError::AmbiguousTarget {
                    table: stmt.table.clone().unwrap_or_default(),
                    columns: columns.clone(),
                });
            }
            if rows == 0 {
                warn!(
                    op = %stmt.origin.phase,
                    index = stmt.origin.index,
                    table = stmt.table.as_deref().unwrap_or_default(),
                    "Keyed statement matched no row"
                );
            }
        }
        Ok(rows)
    }
}

async fn rollback<C: Connection>(conn: &mut C) {
    match conn.rollback().await {
        Ok(()) => warn!("Transaction rolled back"),
        Err(e) => warn!(error = %e, "Rollback failed"),
    }
}
