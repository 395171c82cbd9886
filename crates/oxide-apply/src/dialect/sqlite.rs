//! SQLite dialect.
//!
//! SQLite has no `TRUNCATE`; emptying a table is a plain `DELETE FROM`,
//! which the engine optimizes the same way. `ALTER TABLE` is limited to
//! rename and add/drop column, so column type, nullability and default
//! changes are unsupported. Index names, not table names, carry the schema.

use super::{Capabilities, Dialect, DialectKind};
use crate::value::SqlValue;

/// SQLite dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            truncate: true,
            table_ddl: true,
            create_database: false,
            drop_database: false,
            duplicate_table: true,
            generated_column_introspection: true,
            multi_row_insert: true,
            transactional_ddl: true,
            alter_column: false,
            drop_column: true, // 3.35.0+
            rename_column: true, // 3.25.0+
            rename_table: true,
            max_insert_rows: None,
            max_params: Some(32_766), // SQLITE_MAX_VARIABLE_NUMBER default since 3.32
        }
    }

    fn default_schema(&self) -> Option<&'static str> {
        Some("main")
    }

    fn format_literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
            other => other.to_sql_inline(),
        }
    }

    fn truncate_table(&self, schema: Option<&str>, table: &str) -> String {
        format!("DELETE FROM {}", self.qualified_name(schema, table))
    }

    fn set_data_type(&self, _: Option<&str>, _: &str, _: &str, _: &str) -> Option<String> {
        None
    }

    fn set_nullable(&self, _: Option<&str>, _: &str, _: &str, _: bool) -> Option<String> {
        None
    }

    fn set_default(
        &self,
        _: Option<&str>,
        _: &str,
        _: &str,
        _: Option<&SqlValue>,
    ) -> Option<String> {
        None
    }

    fn create_index(
        &self,
        schema: Option<&str>,
        table: &str,
        name: &str,
        columns: &[String],
        unique: bool,
    ) -> String {
        let cols: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.qualified_name(schema, name),
            self.quote_identifier(table),
            cols.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    #[test]
    fn test_sqlite_dialect() {
        let d = dialect();
        assert_eq!(d.name(), "sqlite");
        assert_eq!(d.default_schema(), Some("main"));
        assert!(d.capabilities().truncate);
        assert!(!d.capabilities().create_database);
        assert!(!d.capabilities().alter_column);
    }

    #[test]
    fn test_truncate_is_delete() {
        assert_eq!(
            dialect().truncate_table(Some("main"), "users"),
            "DELETE FROM \"main\".\"users\""
        );
    }

    #[test]
    fn test_bool_literals() {
        assert_eq!(dialect().format_literal(&SqlValue::Bool(true)), "1");
        assert_eq!(dialect().format_literal(&SqlValue::Bool(false)), "0");
    }

    #[test]
    fn test_duplicate_table() {
        assert_eq!(
            dialect().duplicate_table(Some("main"), "users", "users_copy"),
            vec!["CREATE TABLE \"main\".\"users_copy\" AS SELECT * FROM \"main\".\"users\""]
        );
    }

    #[test]
    fn test_create_index_qualifies_index_name() {
        let sql = dialect().create_index(
            Some("main"),
            "users",
            "idx_users_email",
            &["email".to_string()],
            true,
        );
        assert_eq!(
            sql,
            "CREATE UNIQUE INDEX \"main\".\"idx_users_email\" ON \"users\" (\"email\")"
        );
    }

    #[test]
    fn test_no_column_alteration() {
        assert!(dialect().set_data_type(None, "t", "c", "TEXT").is_none());
        assert!(dialect().set_nullable(None, "t", "c", true).is_none());
    }
}
