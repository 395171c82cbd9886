//! Change compiler.
//!
//! Turns a [`Batch`] into an ordered list of dialect-bound statements. Each
//! statement carries two texts built from the same pieces: `sql`, with
//! placeholders, which is what runs, and `preview`, with literals inlined,
//! which is what the renderer shows. Compilation is pure: it reads table
//! metadata from a [`MetadataSnapshot`] resolved beforehand and never
//! touches a connection.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::{MetadataSnapshot, TableKey, TableMetadata};
use crate::changes::{ChangeSet, DeleteOp, InsertOp, KeyValue, RowData, UpdateOp};
use crate::dialect::{Dialect, ParamStyle};
use crate::error::{ApplyError, Result};
use crate::structure::{AlterChange, Batch, ColumnDef, StructuralOp};
use crate::value::SqlValue;

static DATA_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_ ]*(\(\s*\d+\s*(,\s*\d+\s*)?\))?(\s*\[\])?$")
        .expect("Invalid data type pattern regex")
});

/// Which part of a batch produced a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// An [`InsertOp`].
    Insert,
    /// An [`UpdateOp`].
    Update,
    /// A [`DeleteOp`].
    Delete,
    /// A [`StructuralOp`].
    Structural,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Structural => "structural",
        })
    }
}

/// The op a statement came from: phase and position in the caller's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementOrigin {
    /// Phase of the op.
    pub phase: Phase,
    /// Index of the op within its list.
    pub index: usize,
}

impl StatementOrigin {
    const fn new(phase: Phase, index: usize) -> Self {
        Self { phase, index }
    }
}

/// A single compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    /// Producing op.
    pub origin: StatementOrigin,
    /// Statement text with placeholders.
    pub sql: String,
    /// Bound parameters, in placeholder order.
    pub params: Vec<SqlValue>,
    /// Statement text with literals in place of placeholders.
    pub preview: String,
    /// Key predicate columns, for statements that must hit at most one row.
    pub key_columns: Option<Vec<String>>,
    /// Qualified name of the target table, for messages.
    pub table: Option<String>,
}

impl CompiledStatement {
    fn raw(origin: StatementOrigin, sql: String, table: Option<String>) -> Self {
        Self {
            origin,
            preview: sql.clone(),
            sql,
            params: Vec::new(),
            key_columns: None,
            table,
        }
    }

    /// Whether more than one affected row is an error.
    #[must_use]
    pub const fn expects_single_row(&self) -> bool {
        self.key_columns.is_some()
    }
}

/// Catalog entries to drop once a batch has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// One table.
    Table(TableKey),
    /// Every cached table.
    All,
}

/// Output of [`compile`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledBatch {
    /// Statements in execution order.
    pub statements: Vec<CompiledStatement>,
    /// Catalog invalidations to apply after success.
    pub invalidations: Vec<Invalidation>,
    /// Whether the statements run inside one transaction.
    pub transactional: bool,
}

impl CompiledBatch {
    /// Returns true if there is nothing to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }
}

/// Builds the executable text and the preview text side by side.
struct SqlWriter<'d> {
    dialect: &'d dyn Dialect,
    style: ParamStyle,
    sql: String,
    preview: String,
    params: Vec<SqlValue>,
}

impl<'d> SqlWriter<'d> {
    fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            style: dialect.param_style(),
            sql: String::new(),
            preview: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
        self.preview.push_str(text);
    }

    fn bind(&mut self, value: &SqlValue) {
        self.params.push(value.clone());
        self.sql.push_str(&self.style.placeholder(self.params.len()));
        self.preview.push_str(&self.dialect.format_literal(value));
    }

    fn key_predicate(&mut self, key: &[KeyValue]) {
        self.push(" WHERE ");
        for (i, pair) in key.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            let column = self.dialect.quote_identifier(&pair.column);
            self.push(&column);
            if pair.value.is_null() {
                // `= NULL` never matches.
                self.push(" IS NULL");
            } else {
                self.push(" = ");
                self.bind(&pair.value);
            }
        }
    }

    fn finish(self, origin: StatementOrigin) -> CompiledStatement {
        CompiledStatement {
            origin,
            sql: self.sql,
            params: self.params,
            preview: self.preview,
            key_columns: None,
            table: None,
        }
    }
}

/// Schema an op runs against: its own, else the session default.
#[must_use]
pub fn resolve_schema<'a>(schema: Option<&'a str>, default_schema: Option<&'a str>) -> Option<&'a str> {
    schema.or(default_schema)
}

/// Every table a batch needs metadata for, with schemas resolved.
#[must_use]
pub fn referenced_tables(batch: &Batch, default_schema: Option<&str>) -> Vec<TableKey> {
    let mut keys: Vec<TableKey> = Vec::new();
    let targets = batch
        .changes
        .tables()
        .chain(batch.structural.iter().filter_map(StructuralOp::target_table));
    for (schema, table) in targets {
        let key = TableKey::new(resolve_schema(schema, default_schema), table);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Compiles a batch.
///
/// # Errors
///
/// Returns a validation error (`MixedOperation`, `NotFound`,
/// `AmbiguousTarget`, `InvalidColumn`, `UnsupportedOperation`) when the
/// batch cannot be expressed safely. No partial output is returned.
pub fn compile(
    batch: &Batch,
    dialect: &dyn Dialect,
    metadata: &MetadataSnapshot,
    default_schema: Option<&str>,
) -> Result<CompiledBatch> {
    if !batch.changes.is_empty() && !batch.structural.is_empty() {
        return Err(ApplyError::MixedOperation);
    }
    let compiler = Compiler {
        dialect,
        metadata,
        default_schema,
    };
    if batch.structural.is_empty() {
        compiler.compile_changes(&batch.changes)
    } else {
        compiler.compile_structural(&batch.structural)
    }
}

struct Compiler<'a> {
    dialect: &'a dyn Dialect,
    metadata: &'a MetadataSnapshot,
    default_schema: Option<&'a str>,
}

impl<'a> Compiler<'a> {
    fn table(&self, schema: Option<&'a str>, table: &str) -> Result<(Option<&'a str>, &'a TableMetadata)> {
        let schema = resolve_schema(schema, self.default_schema);
        let meta = self.metadata.get(schema, table).ok_or_else(|| {
            ApplyError::table_not_found(match schema {
                Some(s) => format!("{s}.{table}"),
                None => table.to_string(),
            })
        })?;
        Ok((schema, meta))
    }

    fn unsupported(&self, operation: impl Into<String>) -> ApplyError {
        ApplyError::UnsupportedOperation {
            dialect: self.dialect.name(),
            operation: operation.into(),
        }
    }

    fn writable_column(meta: &TableMetadata, column: &str) -> Result<()> {
        let col = meta
            .find_column(column)
            .ok_or_else(|| ApplyError::column_not_found(&meta.display_name(), column))?;
        if col.generated {
            return Err(ApplyError::InvalidColumn {
                table: meta.display_name(),
                column: column.to_string(),
                reason: String::from("column is generated"),
            });
        }
        Ok(())
    }

    fn check_key(meta: &TableMetadata, key: &[KeyValue]) -> Result<()> {
        for pair in key {
            if meta.find_column(&pair.column).is_none() {
                return Err(ApplyError::column_not_found(
                    &meta.display_name(),
                    &pair.column,
                ));
            }
        }
        let columns: Vec<&str> = key.iter().map(|k| k.column.as_str()).collect();
        if meta.identifies_single_row(&columns) {
            Ok(())
        } else {
            Err(ApplyError::AmbiguousTarget {
                table: meta.display_name(),
                columns: columns.iter().map(|c| (*c).to_string()).collect(),
            })
        }
    }

    fn compile_changes(&self, changes: &ChangeSet) -> Result<CompiledBatch> {
        let mut statements = Vec::new();
        for (index, op) in changes.inserts.iter().enumerate() {
            self.compile_insert(index, op, &mut statements)?;
        }
        for (index, op) in changes.updates.iter().enumerate() {
            statements.push(self.compile_update(index, op)?);
        }
        for (index, op) in changes.deletes.iter().enumerate() {
            statements.push(self.compile_delete(index, op)?);
        }
        Ok(CompiledBatch {
            statements,
            invalidations: Vec::new(),
            transactional: true,
        })
    }

    fn compile_insert(
        &self,
        index: usize,
        op: &InsertOp,
        out: &mut Vec<CompiledStatement>,
    ) -> Result<()> {
        let (schema, meta) = self.table(op.schema.as_deref(), &op.table)?;
        for row in &op.rows {
            for column in row.keys() {
                Self::writable_column(meta, column)?;
            }
        }

        let origin = StatementOrigin::new(Phase::Insert, index);
        let caps = self.dialect.capabilities();

        let mut rows = op.rows.iter().peekable();
        while let Some(first) = rows.next() {
            if first.is_empty() {
                let sql = self.dialect.insert_default_values(schema, &op.table);
                out.push(CompiledStatement::raw(origin, sql, Some(meta.display_name())));
                continue;
            }
            let mut group: Vec<&RowData> = vec![first];
            if caps.multi_row_insert {
                while let Some(next) = rows.next_if(|r| r.keys().eq(first.keys())) {
                    group.push(next);
                }
            }
            for chunk in group.chunks(caps.insert_chunk_rows(first.len())) {
                let mut stmt = self.insert_statement(schema, &op.table, chunk, origin);
                stmt.table = Some(meta.display_name());
                out.push(stmt);
            }
        }
        Ok(())
    }

    /// One `INSERT` for rows sharing the column set of `rows[0]`.
    fn insert_statement(
        &self,
        schema: Option<&str>,
        table: &str,
        rows: &[&RowData],
        origin: StatementOrigin,
    ) -> CompiledStatement {
        let mut w = SqlWriter::new(self.dialect);
        let columns: Vec<String> = rows[0]
            .keys()
            .map(|c| self.dialect.quote_identifier(c))
            .collect();
        w.push(&format!(
            "INSERT INTO {} ({}) VALUES ",
            self.dialect.qualified_name(schema, table),
            columns.join(", ")
        ));
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push("(");
            for (j, value) in row.values().enumerate() {
                if j > 0 {
                    w.push(", ");
                }
                w.bind(value);
            }
            w.push(")");
        }
        w.finish(origin)
    }

    fn compile_update(&self, index: usize, op: &UpdateOp) -> Result<CompiledStatement> {
        let (schema, meta) = self.table(op.schema.as_deref(), &op.table)?;
        Self::writable_column(meta, &op.column)?;
        Self::check_key(meta, &op.primary_key)?;

        let mut w = SqlWriter::new(self.dialect);
        w.push(&format!(
            "UPDATE {} SET {} = ",
            self.dialect.qualified_name(schema, &op.table),
            self.dialect.quote_identifier(&op.column)
        ));
        w.bind(&op.value);
        w.key_predicate(&op.primary_key);

        let mut stmt = w.finish(StatementOrigin::new(Phase::Update, index));
        stmt.key_columns = Some(op.primary_key.iter().map(|k| k.column.clone()).collect());
        stmt.table = Some(meta.display_name());
        Ok(stmt)
    }

    fn compile_delete(&self, index: usize, op: &DeleteOp) -> Result<CompiledStatement> {
        let (schema, meta) = self.table(op.schema.as_deref(), &op.table)?;
        Self::check_key(meta, &op.primary_key)?;

        let mut w = SqlWriter::new(self.dialect);
        w.push(&format!(
            "DELETE FROM {}",
            self.dialect.qualified_name(schema, &op.table)
        ));
        w.key_predicate(&op.primary_key);

        let mut stmt = w.finish(StatementOrigin::new(Phase::Delete, index));
        stmt.key_columns = Some(op.primary_key.iter().map(|k| k.column.clone()).collect());
        stmt.table = Some(meta.display_name());
        Ok(stmt)
    }

    fn compile_structural(&self, ops: &[StructuralOp]) -> Result<CompiledBatch> {
        let mut out = CompiledBatch {
            transactional: self.dialect.capabilities().transactional_ddl
                && !ops.iter().any(StructuralOp::is_database_level),
            ..CompiledBatch::default()
        };
        for (index, op) in ops.iter().enumerate() {
            self.compile_structural_op(StatementOrigin::new(Phase::Structural, index), op, &mut out)?;
        }
        Ok(out)
    }

    #[allow(clippy::too_many_lines)]
    fn compile_structural_op(
        &self,
        origin: StatementOrigin,
        op: &StructuralOp,
        out: &mut CompiledBatch,
    ) -> Result<()> {
        let caps = self.dialect.capabilities();
        let d = self.dialect;
        match op {
            StructuralOp::DropTable { table, schema } => {
                if !caps.table_ddl {
                    return Err(self.unsupported(op.describe()));
                }
                let (schema, meta) = self.table(schema.as_deref(), table)?;
                out.statements.push(CompiledStatement::raw(
                    origin,
                    d.drop_table(schema, table),
                    Some(meta.display_name()),
                ));
                out.invalidations.push(Invalidation::Table(TableKey::new(schema, table)));
            }
            StructuralOp::TruncateTable { table, schema } => {
                if !caps.truncate {
                    return Err(self.unsupported(op.describe()));
                }
                let (schema, meta) = self.table(schema.as_deref(), table)?;
                out.statements.push(CompiledStatement::raw(
                    origin,
                    d.truncate_table(schema, table),
                    Some(meta.display_name()),
                ));
                out.invalidations.push(Invalidation::Table(TableKey::new(schema, table)));
            }
            StructuralOp::DuplicateTable {
                table,
                schema,
                new_name,
            } => {
                if !caps.duplicate_table {
                    return Err(self.unsupported(op.describe()));
                }
                let (schema, meta) = self.table(schema.as_deref(), table)?;
                for sql in d.duplicate_table(schema, table, new_name) {
                    out.statements.push(CompiledStatement::raw(
                        origin,
                        sql,
                        Some(meta.display_name()),
                    ));
                }
                out.invalidations
                    .push(Invalidation::Table(TableKey::new(schema, new_name)));
            }
            StructuralOp::RenameTable {
                table,
                schema,
                new_name,
            } => {
                if !caps.rename_table {
                    return Err(self.unsupported(op.describe()));
                }
                let (schema, meta) = self.table(schema.as_deref(), table)?;
                out.statements.push(CompiledStatement::raw(
                    origin,
                    d.rename_table(schema, table, new_name),
                    Some(meta.display_name()),
                ));
                out.invalidations.push(Invalidation::Table(TableKey::new(schema, table)));
                out.invalidations
                    .push(Invalidation::Table(TableKey::new(schema, new_name)));
            }
            StructuralOp::AlterTable {
                table,
                schema,
                changes,
            } => {
                let (schema, meta) = self.table(schema.as_deref(), table)?;
                for change in changes {
                    let sql = self.alter_statement(schema, meta, change)?;
                    out.statements.push(CompiledStatement::raw(
                        origin,
                        sql,
                        Some(meta.display_name()),
                    ));
                }
                out.invalidations.push(Invalidation::Table(TableKey::new(schema, table)));
            }
            StructuralOp::CreateIndex {
                table,
                schema,
                name,
                columns,
                unique,
            } => {
                if !caps.table_ddl {
                    return Err(self.unsupported(op.describe()));
                }
                let (schema, meta) = self.table(schema.as_deref(), table)?;
                if columns.is_empty() {
                    return Err(ApplyError::Config(format!("index {name} lists no columns")));
                }
                for column in columns {
                    if meta.find_column(column).is_none() {
                        return Err(ApplyError::column_not_found(&meta.display_name(), column));
                    }
                }
                out.statements.push(CompiledStatement::raw(
                    origin,
                    d.create_index(schema, table, name, columns, *unique),
                    Some(meta.display_name()),
                ));
                out.invalidations.push(Invalidation::Table(TableKey::new(schema, table)));
            }
            StructuralOp::DropIndex {
                table,
                schema,
                name,
            } => {
                if !caps.table_ddl {
                    return Err(self.unsupported(op.describe()));
                }
                let (schema, meta) = self.table(schema.as_deref(), table)?;
                out.statements.push(CompiledStatement::raw(
                    origin,
                    d.drop_index(schema, table, name),
                    Some(meta.display_name()),
                ));
                out.invalidations.push(Invalidation::Table(TableKey::new(schema, table)));
            }
            StructuralOp::CreateDatabase { name } => {
                if !caps.create_database {
                    return Err(self.unsupported(op.describe()));
                }
                out.statements
                    .push(CompiledStatement::raw(origin, d.create_database(name), None));
            }
            StructuralOp::DropDatabase { name } => {
                if !caps.drop_database {
                    return Err(self.unsupported(op.describe()));
                }
                out.statements
                    .push(CompiledStatement::raw(origin, d.drop_database(name), None));
                out.invalidations.push(Invalidation::All);
            }
        }
        Ok(())
    }

    fn alter_statement(
        &self,
        schema: Option<&str>,
        meta: &TableMetadata,
        change: &AlterChange,
    ) -> Result<String> {
        let caps = self.dialect.capabilities();
        let d = self.dialect;
        let table = meta.name.as_str();
        if let Some(column) = change.target_column() {
            if meta.find_column(column).is_none() {
                return Err(ApplyError::column_not_found(&meta.display_name(), column));
            }
        }
        let sql = match change {
            AlterChange::AddColumn { column } => {
                if !caps.table_ddl {
                    return Err(self.unsupported("add column"));
                }
                check_column_def(meta, column)?;
                Some(d.add_column(schema, table, column))
            }
            AlterChange::DropColumn { column } => {
                if !caps.drop_column {
                    return Err(self.unsupported("drop column"));
                }
                Some(d.drop_column(schema, table, column))
            }
            AlterChange::RenameColumn { column, new_name } => {
                if !caps.rename_column {
                    return Err(self.unsupported("rename column"));
                }
                Some(d.rename_column(schema, table, column, new_name))
            }
            AlterChange::SetDataType { column, data_type } => {
                if !caps.alter_column {
                    return Err(self.unsupported("change column type"));
                }
                check_data_type(meta, column, data_type)?;
                d.set_data_type(schema, table, column, data_type)
            }
            AlterChange::SetNullable { column, nullable } => {
                if !caps.alter_column {
                    return Err(self.unsupported("change column nullability"));
                }
                d.set_nullable(schema, table, column, *nullable)
            }
            AlterChange::SetDefault { column, default } => {
                if !caps.alter_column {
                    return Err(self.unsupported("change column default"));
                }
                d.set_default(schema, table, column, default.as_ref())
            }
        };
        sql.ok_or_else(|| self.unsupported(alter_label(change)))
    }
}

const fn alter_label(change: &AlterChange) -> &'static str {
    match change {
        AlterChange::AddColumn { .. } => "add column",
        AlterChange::DropColumn { .. } => "drop column",
        AlterChange::RenameColumn { .. } => "rename column",
        AlterChange::SetDataType { .. } => "change column type",
        AlterChange::SetNullable { .. } => "change column nullability",
        AlterChange::SetDefault { .. } => "change column default",
    }
}

fn check_column_def(meta: &TableMetadata, column: &ColumnDef) -> Result<()> {
    if meta.find_column(&column.name).is_some() {
        return Err(ApplyError::InvalidColumn {
            table: meta.display_name(),
            column: column.name.clone(),
            reason: String::from("column already exists"),
        });
    }
    check_data_type(meta, &column.name, &column.data_type)
}

fn check_data_type(meta: &TableMetadata, column: &str, data_type: &str) -> Result<()> {
    if DATA_TYPE.is_match(data_type.trim()) {
        Ok(())
    } else {
        Err(ApplyError::InvalidColumn {
            table: meta.display_name(),
            column: column.to_string(),
            reason: format!("invalid data type '{data_type}'"),
        })
    }
}
