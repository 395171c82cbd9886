//! Microsoft SQL Server dialect.
//!
//! Bracket quoting, `@Pn` parameters, `sp_rename` for renames and
//! `SELECT ... INTO` for duplication.

use super::{Capabilities, Dialect, DialectKind, ParamStyle};
use crate::structure::ColumnDef;
use crate::value::{hex, SqlValue};

/// SQL Server dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    /// Creates a new SQL Server dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// `sp_rename` takes the object name as a string, unbracketed parts
    /// joined with dots.
    fn object_path(schema: Option<&str>, parts: &[&str]) -> String {
        let mut path: Vec<&str> = Vec::with_capacity(parts.len() + 1);
        if let Some(schema) = schema {
            path.push(schema);
        }
        path.extend_from_slice(parts);
        path.join(".")
    }
}

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Sqlserver
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
            transactional_ddl: true,
            alter_column: true,
            drop_column: true,
            rename_column: true,
            rename_table: true,
            max_insert_rows: Some(1_000),
            max_params: Some(2_100),
        }
    }

    fn default_schema(&self) -> Option<&'static str> {
        Some("dbo")
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('[', ']')
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Named
    }

    fn format_literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
            SqlValue::Text(s) => format!("N'{}'", s.replace('\'', "''")),
            SqlValue::Blob(bytes) => format!("0x{}", hex(bytes)),
            other => other.to_sql_inline(),
        }
    }

    fn duplicate_table(&self, schema: Option<&str>, table: &str, new_name: &str) -> Vec<String> {
        vec![format!(
            "SELECT * INTO {} FROM {}",
            self.qualified_name(schema, new_name),
            self.qualified_name(schema, table)
        )]
    }

    fn rename_table(&self, schema: Option<&str>, table: &str, new_name: &str) -> String {
        format!(
            "EXEC sp_rename {}, {}",
            self.format_literal(&SqlValue::Text(Self::object_path(schema, &[table]))),
            self.format_literal(&SqlValue::Text(new_name.to_string()))
        )
    }

    fn add_column(&self, schema: Option<&str>, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.qualified_name(schema, table),
            self.column_definition(column)
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
            "EXEC sp_rename {}, {}, 'COLUMN'",
            self.format_literal(&SqlValue::Text(Self::object_path(schema, &[table, column]))),
            self.format_literal(&SqlValue::Text(new_name.to_string()))
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
            "ALTER TABLE {} ALTER COLUMN {} {}",
            self.qualified_name(schema, table),
            self.quote_identifier(column),
            data_type
        ))
    }

    // ALTER COLUMN restates the type; defaults are named constraints.
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

    fn drop_index(&self, schema: Option<&str>, table: &str, name: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(name),
            self.qualified_name(schema, table)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect() -> SqlServerDialect {
        SqlServerDialect::new()
    }

    #[test]
    fn test_bracket_quoting() {
        assert_eq!(dialect().quote_identifier("order"), "[order]");
        assert_eq!(dialect().quote_identifier("a]b"), "[a]]b]");
        assert_eq!(dialect().qualified_name(Some("dbo"), "t"), "[dbo].[t]");
    }

    #[test]
    fn test_literals() {
        let d = dialect();
        assert_eq!(d.format_literal(&SqlValue::Text(String::from("it's"))), "N'it''s'");
        assert_eq!(d.format_literal(&SqlValue::Bool(true)), "1");
        assert_eq!(d.format_literal(&SqlValue::Blob(vec![0x0A, 0xFF])), "0x0AFF");
    }

    #[test]
    fn test_rename_uses_sp_rename() {
        let d = dialect();
        assert_eq!(
            d.rename_table(Some("dbo"), "users", "accounts"),
            "EXEC sp_rename N'dbo.users', N'accounts'"
        );
        assert_eq!(
            d.rename_column(Some("dbo"), "users", "name", "full_name"),
            "EXEC sp_rename N'dbo.users.name', N'full_name', 'COLUMN'"
        );
    }

    #[test]
    fn test_duplicate_is_select_into() {
        assert_eq!(
            dialect().duplicate_table(Some("dbo"), "users", "users_copy"),
            vec!["SELECT * INTO [dbo].[users_copy] FROM [dbo].[users]"]
        );
    }
}
