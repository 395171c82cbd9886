//! PostgreSQL dialect.

use super::{Capabilities, Dialect, DialectKind, ParamStyle};
use crate::value::{hex, SqlValue};

/// PostgreSQL dialect (also used for CockroachDB and Redshift).
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Postgresql
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
            max_insert_rows: None,
            max_params: Some(65_535),
        }
    }

    fn default_schema(&self) -> Option<&'static str> {
        Some("public")
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Numbered
    }

    fn format_literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Blob(bytes) => format!("'\\x{}'::bytea", hex(bytes).to_lowercase()),
            other => other.to_sql_inline(),
        }
    }

    fn duplicate_table(&self, schema: Option<&str>, table: &str, new_name: &str) -> Vec<String> {
        let source = self.qualified_name(schema, table);
        let target = self.qualified_name(schema, new_name);
        vec![
            format!("CREATE TABLE {target} (LIKE {source} INCLUDING ALL)"),
            format!("INSERT INTO {target} SELECT * FROM {source}"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect() -> PostgresDialect {
        PostgresDialect::new()
    }

    #[test]
    fn test_postgres_dialect() {
        let d = dialect();
        assert_eq!(d.name(), "postgresql");
        assert_eq!(d.default_schema(), Some("public"));
        assert_eq!(d.param_style(), ParamStyle::Numbered);
        assert!(d.capabilities().transactional_ddl);
    }

    #[test]
    fn test_blob_literal() {
        assert_eq!(
            dialect().format_literal(&SqlValue::Blob(vec![0xDE, 0xAD])),
            "'\\xdead'::bytea"
        );
    }

    #[test]
    fn test_duplicate_table_is_two_statements() {
        let sql = dialect().duplicate_table(Some("public"), "users", "users_copy");
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE \"public\".\"users_copy\" (LIKE \"public\".\"users\" INCLUDING ALL)",
                "INSERT INTO \"public\".\"users_copy\" SELECT * FROM \"public\".\"users\"",
            ]
        );
    }

    #[test]
    fn test_alter_column_forms() {
        let d = dialect();
        assert_eq!(
            d.set_data_type(Some("public"), "users", "age", "BIGINT").unwrap(),
            "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"age\" TYPE BIGINT"
        );
        assert_eq!(
            d.set_nullable(None, "users", "age", false).unwrap(),
            "ALTER TABLE \"users\" ALTER COLUMN \"age\" SET NOT NULL"
        );
        assert_eq!(
            d.set_default(None, "users", "age", None).unwrap(),
            "ALTER TABLE \"users\" ALTER COLUMN \"age\" DROP DEFAULT"
        );
    }

    #[test]
    fn test_rename_table_keeps_new_name_unqualified() {
        assert_eq!(
            dialect().rename_table(Some("public"), "users", "accounts"),
            "ALTER TABLE \"public\".\"users\" RENAME TO \"accounts\""
        );
    }

    #[test]
    fn test_drop_index_is_schema_qualified() {
        assert_eq!(
            dialect().drop_index(Some("public"), "users", "idx_users_email"),
            "DROP INDEX \"public\".\"idx_users_email\""
        );
    }
}
