//! Session: one connection with its dialect, catalog and access policy.
//!
//! Every mutating call flows the same way: read-only guard, metadata
//! resolution, compilation, execution, catalog invalidation. Rendering
//! stops after compilation.

use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::{ColumnMetadata, Introspect, SchemaCatalog, TableMetadata};
use crate::changes::ChangeSet;
use crate::compiler::{compile, referenced_tables, CompiledBatch, Invalidation};
use crate::config::SessionConfig;
use crate::dialect::Dialect;
use crate::error::{ApplyError, Result};
use crate::executor::{CancelHandle, Connection, ExecutionResult, QueryResult, TransactionExecutor};
use crate::guard::{is_read_statement, AccessMode, ReadOnlyGuard};
use crate::render::render_compiled;
use crate::structure::{AlterChange, Batch, StructuralOp};
use crate::value::SqlValue;

/// A connection object.
///
/// Calls take `&mut self`, so one session never runs two batches at once.
#[derive(Debug)]
pub struct Session<C> {
    conn: C,
    dialect: Box<dyn Dialect>,
    catalog: SchemaCatalog,
    guard: ReadOnlyGuard,
    executor: TransactionExecutor,
    config: SessionConfig,
}

impl<C: Connection + Introspect> Session<C> {
    /// Wraps an open connection.
    pub fn new(conn: C, config: SessionConfig) -> Self {
        info!(
            dialect = %config.dialect,
            read_only = config.read_only,
            "Opening session"
        );
        Self {
            conn,
            dialect: config.dialect.dialect(),
            catalog: SchemaCatalog::new(),
            guard: ReadOnlyGuard::new(config.access_mode()),
            executor: TransactionExecutor::new(),
            config,
        }
    }

    /// The session's dialect.
    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// The session's configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The metadata cache.
    #[must_use]
    pub const fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// The underlying connection.
    pub fn connection(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Handle that cancels the batch currently running on this session.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.executor.cancel_handle()
    }

    /// Schema used for entries that name none.
    #[must_use]
    pub fn default_schema(&self) -> Option<&str> {
        self.config
            .default_schema
            .as_deref()
            .or_else(|| self.dialect.default_schema())
    }

    fn schema<'a>(&'a self, schema: Option<&'a str>) -> Option<&'a str> {
        schema.or_else(|| self.default_schema())
    }

    /// Whether the session refuses writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.guard.is_read_only()
    }

    /// Switches read-only mode. Takes effect for the next call.
    pub fn set_read_only(&mut self, read_only: bool) {
        let mode = if read_only {
            AccessMode::ReadOnly
        } else {
            AccessMode::Normal
        };
        debug!(?mode, "Access mode changed");
        self.guard.set_mode(mode);
        self.config.read_only = read_only;
    }

    async fn prepare(&mut self, batch: &Batch) -> Result<CompiledBatch> {
        let default_schema = self
            .config
            .default_schema
            .clone()
            .or_else(|| self.dialect.default_schema().map(str::to_string));
        let keys = referenced_tables(batch, default_schema.as_deref());
        let snapshot = self.catalog.snapshot(&mut self.conn, keys).await?;
        compile(batch, self.dialect.as_ref(), &snapshot, default_schema.as_deref())
    }

    fn invalidate_after(&mut self, compiled: &CompiledBatch) {
        for invalidation in &compiled.invalidations {
            match invalidation {
                Invalidation::Table(key) => {
                    self.catalog
                        .invalidate(key.schema.as_deref(), Some(&key.name));
                }
                Invalidation::All => self.catalog.invalidate_all(),
            }
        }
    }

    /// Applies a batch atomically.
    ///
    /// # Errors
    ///
    /// Fails without touching the connection in read-only mode or when the
    /// batch does not validate. Execution errors carry the failing
    /// statement's index and SQL; the batch is rolled back.
    pub async fn apply(&mut self, batch: &Batch) -> Result<ExecutionResult> {
        self.guard.check(batch)?;
        let compiled = self.prepare(batch).await?;
        let result = self.executor.execute(&mut self.conn, &compiled).await;
        // A failed non-transactional batch may have run some statements.
        if result.is_ok() || !compiled.transactional {
            self.invalidate_after(&compiled);
        }
        result
    }

    /// Returns the SQL `apply` would run, with literals inlined.
    ///
    /// # Errors
    ///
    /// Returns the validation error `apply` would report. Introspection
    /// failures come back as `Catalog`.
    pub async fn render(&mut self, batch: &Batch) -> Result<String> {
        let compiled = self.prepare(batch).await?;
        Ok(render_compiled(&compiled))
    }

    /// Applies row edits atomically.
    ///
    /// # Errors
    ///
    /// See [`Session::apply`].
    pub async fn apply_changes(&mut self, changes: ChangeSet) -> Result<ExecutionResult> {
        self.apply(&changes.into()).await
    }

    /// Returns the SQL `apply_changes` would run.
    ///
    /// # Errors
    ///
    /// See [`Session::render`].
    pub async fn apply_changes_sql(&mut self, changes: ChangeSet) -> Result<String> {
        self.render(&changes.into()).await
    }

    /// Drops a table.
    ///
    /// # Errors
    ///
    /// Fails in read-only mode, when the table does not exist, when the
    /// dialect cannot express the operation, or when the engine rejects a
    /// statement. The batch is rolled back where the dialect allows.
    pub async fn drop_table(&mut self, schema: Option<&str>, table: &str) -> Result<ExecutionResult> {
        self.apply(&table_op(schema, table, |table, schema| StructuralOp::DropTable {
            table,
            schema,
        }))
        .await
    }

    /// Removes every row of a table.
    ///
    /// # Errors
    ///
    /// Fails in read-only mode, when the table does not exist, when the
    /// dialect cannot express the operation, or when the engine rejects a
    /// statement. The batch is rolled back where the dialect allows.
    pub async fn truncate_table(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<ExecutionResult> {
        self.apply(&table_op(schema, table, |table, schema| {
            StructuralOp::TruncateTable { table, schema }
        }))
        .await
    }

    /// Copies a table, structure and rows, under `new_name`.
    ///
    /// # Errors
    ///
    /// Fails in read-only mode, when the table does not exist, when the
    /// dialect cannot express the operation, or when the engine rejects a
    /// statement. The batch is rolled back where the dialect allows.
    pub async fn duplicate_table(
        &mut self,
        schema: Option<&str>,
        table: &str,
        new_name: &str,
    ) -> Result<ExecutionResult> {
        self.apply(&duplicate_op(schema, table, new_name)).await
    }

    /// Returns the SQL `duplicate_table` would run.
    ///
    /// # Errors
    ///
    /// Fails when the table does not exist or the dialect cannot copy
    /// tables.
    pub async fn duplicate_table_sql(
        &mut self,
        schema: Option<&str>,
        table: &str,
        new_name: &str,
    ) -> Result<String> {
        self.render(&duplicate_op(schema, table, new_name)).await
    }

    /// Renames a table.
    ///
    /// # Errors
    ///
    /// Fails in read-only mode, when the table does not exist, when the
    /// dialect cannot express the operation, or when the engine rejects a
    /// statement. The batch is rolled back where the dialect allows.
    pub async fn rename_table(
        &mut self,
        schema: Option<&str>,
        table: &str,
        new_name: &str,
    ) -> Result<ExecutionResult> {
        let new_name = new_name.to_string();
        self.apply(&table_op(schema, table, |table, schema| {
            StructuralOp::RenameTable {
                table,
                schema,
                new_name,
            }
        }))
        .await
    }

    /// Applies column changes to a table, in order.
    ///
    /// # Errors
    ///
    /// Fails in read-only mode, when the table does not exist, when the
    /// dialect cannot express the operation, or when the engine rejects a
    /// statement. The batch is rolled back where the dialect allows.
    pub async fn alter_table(
        &mut self,
        schema: Option<&str>,
        table: &str,
        changes: Vec<AlterChange>,
    ) -> Result<ExecutionResult> {
        self.apply(&table_op(schema, table, |table, schema| {
            StructuralOp::AlterTable {
                table,
                schema,
                changes,
            }
        }))
        .await
    }

    /// Creates an index.
    ///
    /// # Errors
    ///
    /// Fails in read-only mode, when the table does not exist, when the
    /// dialect cannot express the operation, or when the engine rejects a
    /// statement. The batch is rolled back where the dialect allows.
    pub async fn create_index(
        &mut self,
        schema: Option<&str>,
        table: &str,
        name: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<ExecutionResult> {
        let name = name.to_string();
        let columns = columns.iter().map(|c| (*c).to_string()).collect();
        self.apply(&table_op(schema, table, |table, schema| {
            StructuralOp::CreateIndex {
                table,
                schema,
                name,
                columns,
                unique,
            }
        }))
        .await
    }

    /// Drops an index.
    ///
    /// # Errors
    ///
    /// Fails in read-only mode, when the table does not exist, when the
    /// dialect cannot express the operation, or when the engine rejects a
    /// statement. The batch is rolled back where the dialect allows.
    pub async fn drop_index(
        &mut self,
        schema: Option<&str>,
        table: &str,
        name: &str,
    ) -> Result<ExecutionResult> {
        let name = name.to_string();
        self.apply(&table_op(schema, table, |table, schema| {
            StructuralOp::DropIndex {
                table,
                schema,
                name,
            }
        }))
        .await
    }

    /// Creates a database.
    ///
    /// # Errors
    ///
    /// Fails in read-only mode, when the dialect has no database DDL, or
    /// when the engine rejects the statement.
    pub async fn create_database(&mut self, name: &str) -> Result<ExecutionResult> {
        self.apply(&Batch::from(StructuralOp::CreateDatabase {
            name: name.to_string(),
        }))
        .await
    }

    /// Drops a database.
    ///
    /// # Errors
    ///
    /// Fails in read-only mode, when the dialect has no database DDL, or
    /// when the engine rejects the statement.
    pub async fn drop_database(&mut self, name: &str) -> Result<ExecutionResult> {
        self.apply(&Batch::from(StructuralOp::DropDatabase {
            name: name.to_string(),
        }))
        .await
    }

    /// Lists the tables of a schema.
    ///
    /// # Errors
    ///
    /// Returns `Catalog` when introspection fails.
    pub async fn list_tables(&mut self, schema: Option<&str>) -> Result<Vec<TableMetadata>> {
        let schema = self.schema(schema).map(str::to_string);
        self.catalog
            .list_tables(&mut self.conn, schema.as_deref())
            .await
    }

    /// Lists a table's columns.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing table and `Catalog` when
    /// introspection fails.
    pub async fn list_table_columns(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>> {
        Ok(self.table_metadata(schema, table).await?.columns.clone())
    }

    /// Returns a table's metadata, cached per session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing table and `Catalog` when
    /// introspection fails.
    pub async fn table_metadata(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Arc<TableMetadata>> {
        let schema = self.schema(schema).map(str::to_string);
        self.catalog
            .table_metadata(&mut self.conn, schema.as_deref(), table)
            .await
    }

    /// Runs ad-hoc SQL and returns its rows.
    ///
    /// In read-only mode only reads are accepted. Anything that is not a
    /// read drops the whole metadata cache, since its effect is unknown.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnlyViolation` for a non-read in read-only mode, and
    /// the classified driver error when the engine rejects `sql`.
    pub async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        self.guard.check_query(sql)?;
        debug!(sql = %sql, "Running query");
        let result = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| ApplyError::from_driver(0, sql, e));
        // A failed write may still have run part of its work.
        if !is_read_statement(sql) {
            self.catalog.invalidate_all();
        }
        result
    }

    /// Drops cached metadata for a table, or for a whole schema.
    pub fn invalidate(&mut self, schema: Option<&str>, table: Option<&str>) {
        let schema = self.schema(schema).map(str::to_string);
        self.catalog.invalidate(schema.as_deref(), table);
    }

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns the driver error raised while closing.
    pub async fn close(mut self) -> Result<()> {
        info!("Closing session");
        self.conn
            .close()
            .await
            .map_err(|e| ApplyError::from_driver(0, "CLOSE", e))
    }
}

fn table_op(
    schema: Option<&str>,
    table: &str,
    build: impl FnOnce(String, Option<String>) -> StructuralOp,
) -> Batch {
    Batch::from(build(table.to_string(), schema.map(str::to_string)))
}

fn duplicate_op(schema: Option<&str>, table: &str, new_name: &str) -> Batch {
    let new_name = new_name.to_string();
    table_op(schema, table, |table, schema| StructuralOp::DuplicateTable {
        table,
        schema,
        new_name,
    })
}
