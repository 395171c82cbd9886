//! MySQL / MariaDB dialect.
//!
//! Backtick quoting, backslash escapes inside string literals, and DDL that
//! commits implicitly, so structural batches never run inside a
//! transaction.

use super::{Capabilities, Dialect, DialectKind};
use crate::value::SqlValue;

/// MySQL dialect (also used for MariaDB).
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            truncate: true,
            table_ddl: true,
            create_database: true,
            drop_database: true,
            duplicate_table: true,
            generated_column_introspection: true,
            multi_row_insert: true,
            transactional_ddl: false,
            alter_column: true,
            drop_column: true,
            rename_column: true,
            rename_table: true,
            max_insert_rows: None,
            max_params: Some(65_535),
        }
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('`', '`')
    }

    fn format_literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Text(s) => {
                let escaped = s.replace('\\', "\\\\").replace('\'', "''");
                format!("'{escaped}'")
            }
            other => other.to_sql_inline(),
        }
    }

    fn insert_default_values(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            "INSERT INTO {} () VALUES ()",
            self.qualified_name(schema, table)
        )
    }

    fn duplicate_table(&self, schema: Option<&str>, table: &str, new_name: &str) -> Vec<String> {
        let source = self.qualified_name(schema, table);
        let target = self.qualified_name(schema, new_name);
        vec![
            format!("CREATE TABLE {target} LIKE {source}"),
            format!("INSERT INTO {target} SELECT * FROM {source}"),
        ]
    }

    fn rename_table(&self, schema: Option<&str>, table: &str, new_name: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.qualified_name(schema, table),
            self.qualified_name(schema, new_name)
        )
    }

    fn set_data_type(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        data_type: &str,
    ) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} MODIFY COLUMN {} {}",
            self.qualified_name(schema, table),
            self.quote_identifier(column),
            data_type
        ))
    }

    // MODIFY COLUMN needs the full definition to change nullability.
    fn set_nullable(&self, _: Option<&str>, _: &str, _: &str, _: bool) -> Option<String> {
        None
    }

    fn drop_index(&self, schema: Option<&str>, table: &str, name: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(name),
            self.qualified_name(schema, table)
        )
    }
}
