//! Firebird dialect.
//!
//! Firebird has no `TRUNCATE`, no statement to copy a table, no multi-row
//! `VALUES`, and databases are created by the client library rather than
//! through SQL.

use super::{Capabilities, Dialect, DialectKind};
use crate::structure::ColumnDef;
use crate::value::SqlValue;

/// Firebird dialect (3.0+).
#[derive(Debug, Clone, Copy, Default)]
pub struct FirebirdDialect;

impl FirebirdDialect {
    /// Creates a new Firebird dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for FirebirdDialect {
    fn name(&self) -> &'static str {
        "firebird"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Firebird
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            truncate: false,
            table_ddl: true,
            create_database: false,
            drop_database: false,
            duplicate_table: false,
            generated_column_introspection: true,
            multi_row_insert: false,
            transactional_ddl: true,
            alter_column: true,
            drop_column: true,
            rename_column: true,
            rename_table: false,
            max_insert_rows: None,
            max_params: None,
        }
    }

    // Firebird has no schemas.
    fn qualified_name(&self, _schema: Option<&str>, name: &str) -> String {
        self.quote_identifier(name)
    }

    fn add_column(&self, schema: Option<&str>, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.qualified_name(schema, table),
            self.column_definition(column)
        )
    }

    fn drop_column(&self, schema: Option<&str>, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP {}",
            self.qualified_name(schema, table),
            self.quote_identifier(column)
        )
    }

    fn rename_column(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        new_name: &str,
    ) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} TO {}",
            self.qualified_name(schema, table),
            self.quote_identifier(column),
            self.quote_identifier(new_name)
        )
    }

    fn set_default(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        default: Option<&SqlValue>,
    ) -> Option<String> {
        let action = match default {
            Some(value) => format!("SET DEFAULT {}", self.format_literal(value)),
            None => String::from("DROP DEFAULT"),
        };
        Some(format!(
            "ALTER TABLE {} ALTER {} {}",
            self.qualified_name(schema, table),
            self.quote_identifier(column),
            action
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect() -> FirebirdDialect {
        FirebirdDialect::new()
    }

    #[test]
    fn test_capabilities() {
        let caps = dialect().capabilities();
        assert!(!caps.truncate);
        assert!(!caps.duplicate_table);
        assert!(!caps.multi_row_insert);
        assert!(!caps.create_database);
        assert!(!caps.rename_table);
    }

    #[test]
    fn test_schema_is_ignored() {
        assert_eq!(dialect().qualified_name(Some("main"), "users"), "\"users\"");
    }

    #[test]
    fn test_column_ddl() {
        let d = dialect();
        assert_eq!(
            d.drop_column(None, "users", "email"),
            "ALTER TABLE \"users\" DROP \"email\""
        );
        assert_eq!(
            d.rename_column(None, "users", "name", "full_name"),
            "ALTER TABLE \"users\" ALTER COLUMN \"name\" TO \"full_name\""
        );
    }
}
