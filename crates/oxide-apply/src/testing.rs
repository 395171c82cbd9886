//! In-memory connection used by unit tests.

use std::collections::HashMap;

use crate::catalog::{Introspect, TableMetadata};
use crate::error::DriverError;
use crate::executor::{Connection, QueryResult};
use crate::value::SqlValue;

/// Records every call and answers from a script.
///
/// Statements report one affected row unless a prefix rule says otherwise.
/// `BEGIN`, `COMMIT` and `ROLLBACK` are logged as those words.
#[derive(Debug, Default)]
pub(crate) struct ScriptedConnection {
    pub log: Vec<String>,
    pub tables: Vec<TableMetadata>,
    pub describe_calls: usize,
    pub closed: bool,
    failures: Vec<(String, DriverError)>,
    rows: HashMap<String, u64>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableMetadata) -> Self {
        self.tables.push(table);
        self
    }

    /// The first call whose text starts with `prefix` fails with `error`.
    pub fn fail_on(mut self, prefix: &str, error: DriverError) -> Self {
        self.failures.push((prefix.to_string(), error));
        self
    }

    pub fn rows_for(mut self, prefix: &str, rows: u64) -> Self {
        self.rows.insert(prefix.to_string(), rows);
        self
    }

    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.log
            .iter()
            .map(String::as_str)
            .filter(|l| !matches!(*l, "BEGIN" | "COMMIT" | "ROLLBACK"))
    }

    fn record(&mut self, text: &str) -> Result<(), DriverError> {
        self.log.push(text.to_string());
        match self.failures.iter().position(|(p, _)| text.starts_with(p.as_str())) {
            Some(i) => Err(self.failures.remove(i).1),
            None => Ok(()),
        }
    }
}

impl Connection for ScriptedConnection {
    async fn begin(&mut self) -> Result<(), DriverError> {
        self.record("BEGIN")
    }

    async fn execute(&mut self, sql: &str, _params: &[SqlValue]) -> Result<u64, DriverError> {
        self.record(sql)?;
        Ok(self
            .rows
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map_or(1, |(_, rows)| *rows))
    }

    async fn query(&mut self, sql: &str, _params: &[SqlValue]) -> Result<QueryResult, DriverError> {
        self.record(sql)?;
        Ok(QueryResult {
            columns: vec![String::from("value")],
            rows: vec![vec![SqlValue::Int(1)]],
        })
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.record("COMMIT")
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.record("ROLLBACK")
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        Ok(())
    }
}

impl Introspect for ScriptedConnection {
    async fn list_tables(&mut self, schema: Option<&str>) -> Result<Vec<TableMetadata>, DriverError> {
        Ok(self
            .tables
            .iter()
            .filter(|t| t.schema.as_deref() == schema)
            .map(|t| TableMetadata::named(t.schema.clone(), t.name.clone()))
            .collect())
    }

    async fn describe_table(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Option<TableMetadata>, DriverError> {
        self.describe_calls += 1;
        Ok(self
            .tables
            .iter()
            .find(|t| t.schema.as_deref() == schema && t.name == table)
            .cloned())
    }
}
