//! SQL dialect adapters.
//!
//! Different engines disagree on identifier quoting, parameter placeholders,
//! literal syntax and most DDL. Each engine gets one [`Dialect`]
//! implementation, chosen once from a [`DialectKind`] when a session is set
//! up. The compiler only ever talks to the trait.

mod firebird;
mod generic;
mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

pub use firebird::FirebirdDialect;
pub use generic::GenericDialect;
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ApplyError;
use crate::structure::ColumnDef;
use crate::value::SqlValue;

/// Engine identifier, as found in connection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// SQLite (and libSQL).
    #[serde(alias = "libsql")]
    Sqlite,
    /// PostgreSQL (and CockroachDB, Redshift).
    #[serde(alias = "postgres", alias = "cockroachdb", alias = "redshift")]
    Postgresql,
    /// MySQL and MariaDB.
    #[serde(alias = "mariadb")]
    Mysql,
    /// Microsoft SQL Server.
    #[serde(alias = "mssql")]
    Sqlserver,
    /// Firebird.
    Firebird,
    /// Unknown engine: ANSI quoting, no capabilities.
    Generic,
}

impl DialectKind {
    /// Returns the adapter for this engine.
    #[must_use]
    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::Sqlite => Box::new(SqliteDialect::new()),
            Self::Postgresql => Box::new(PostgresDialect::new()),
            Self::Mysql => Box::new(MySqlDialect::new()),
            Self::Sqlserver => Box::new(SqlServerDialect::new()),
            Self::Firebird => Box::new(FirebirdDialect::new()),
            Self::Generic => Box::new(GenericDialect::new()),
        }
    }

    /// Canonical identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Sqlserver => "sqlserver",
            Self::Firebird => "firebird",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = ApplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "libsql" => Ok(Self::Sqlite),
            "postgresql" | "postgres" | "cockroachdb" | "redshift" => Ok(Self::Postgresql),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "sqlserver" | "mssql" => Ok(Self::Sqlserver),
            "firebird" => Ok(Self::Firebird),
            "generic" => Ok(Self::Generic),
            other => Err(ApplyError::Config(format!("unknown dialect '{other}'"))),
        }
    }
}

/// How bound parameters are written in statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `?`
    Positional,
    /// `$1`, `$2`, ...
    Numbered,
    /// `@P1`, `@P2`, ...
    Named,
}

impl ParamStyle {
    /// Placeholder for the 1-based parameter `n`.
    #[must_use]
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::Positional => String::from("?"),
            Self::Numbered => format!("${n}"),
            Self::Named => format!("@P{n}"),
        }
    }
}

/// What a dialect can do. Anything left unset counts as unsupported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// Emptying a table in one statement.
    pub truncate: bool,
    /// Plain table and index DDL: drop table, add column, create and drop
    /// index.
    pub table_ddl: bool,
    /// `CREATE DATABASE`.
    pub create_database: bool,
    /// `DROP DATABASE`.
    pub drop_database: bool,
    /// Copying a table's structure and rows.
    pub duplicate_table: bool,
    /// Whether introspection reports generated columns.
    pub generated_column_introspection: bool,
    /// `INSERT ... VALUES (...), (...)`.
    pub multi_row_insert: bool,
    /// DDL participates in transactions.
    pub transactional_ddl: bool,
    /// Changing a column's type, nullability or default.
    pub alter_column: bool,
    /// `DROP COLUMN`.
    pub drop_column: bool,
    /// `RENAME COLUMN`.
    pub rename_column: bool,
    /// Renaming a table.
    pub rename_table: bool,
    /// Most rows one multi-row `INSERT` may carry.
    pub max_insert_rows: Option<usize>,
    /// Most bound parameters one statement may carry.
    pub max_params: Option<usize>,
}

impl Capabilities {
    /// Rows per multi-row `INSERT` of `columns` columns, at least one.
    #[must_use]
    pub fn insert_chunk_rows(&self, columns: usize) -> usize {
        let by_params = self
            .max_params
            .map_or(usize::MAX, |max| max / columns.max(1));
        self.max_insert_rows
            .unwrap_or(usize::MAX)
            .min(by_params)
            .max(1)
    }
}

/// Per-engine SQL rules.
///
/// Names passed to the DDL methods are raw (unquoted); the dialect quotes
/// them. All methods are pure.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the engine identifier.
    fn kind(&self) -> DialectKind;

    /// Returns the capability flags.
    fn capabilities(&self) -> Capabilities;

    /// Schema used when neither the request nor the configuration names one.
    fn default_schema(&self) -> Option<&'static str> {
        None
    }

    /// Opening and closing identifier quote characters.
    fn identifier_quotes(&self) -> (char, char) {
        ('"', '"')
    }

    /// Quotes an identifier, doubling embedded closing quotes.
    fn quote_identifier(&self, name: &str) -> String {
        let (open, close) = self.identifier_quotes();
        let mut doubled = String::with_capacity(2);
        doubled.push(close);
        doubled.push(close);
        let escaped = name.replace(close, &doubled);
        format!("{open}{escaped}{close}")
    }

    /// Quotes a possibly schema-qualified name.
    fn qualified_name(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(name)
            ),
            None => self.quote_identifier(name),
        }
    }

    /// Returns the parameter placeholder style.
    fn param_style(&self) -> ParamStyle {
        ParamStyle::Positional
    }

    /// Formats a value as a literal, for previews and DDL defaults.
    fn format_literal(&self, value: &SqlValue) -> String {
        value.to_sql_inline()
    }

    /// `INSERT` of a row that sets no columns.
    fn insert_default_values(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            "INSERT INTO {} DEFAULT VALUES",
            self.qualified_name(schema, table)
        )
    }

    /// `DROP TABLE`.
    fn drop_table(&self, schema: Option<&str>, table: &str) -> String {
        format!("DROP TABLE {}", self.qualified_name(schema, table))
    }

    /// Empties a table.
    fn truncate_table(&self, schema: Option<&str>, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.qualified_name(schema, table))
    }

    /// Copies `table` (structure and rows) into a new table in the same
    /// schema.
    fn duplicate_table(&self, schema: Option<&str>, table: &str, new_name: &str) -> Vec<String> {
        vec![format!(
            "CREATE TABLE {} AS SELECT * FROM {}",
            self.qualified_name(schema, new_name),
            self.qualified_name(schema, table)
        )]
    }

    /// Renames a table within its schema.
    fn rename_table(&self, schema: Option<&str>, table: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.qualified_name(schema, table),
            self.quote_identifier(new_name)
        )
    }

    /// Column definition used by `ADD COLUMN`.
    fn column_definition(&self, column: &ColumnDef) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            column.data_type
        );
        if let Some(ref default) = column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.format_literal(default));
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        sql
    }

    /// `ADD COLUMN`.
    fn add_column(&self, schema: Option<&str>, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.qualified_name(schema, table),
            self.column_definition(column)
        )
    }

    /// `DROP COLUMN`.
    fn drop_column(&self, schema: Option<&str>, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.qualified_name(schema, table),
            self.quote_identifier(column)
        )
    }

    /// `RENAME COLUMN`.
    fn rename_column(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        new_name: &str,
    ) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.qualified_name(schema, table),
            self.quote_identifier(column),
            self.quote_identifier(new_name)
        )
    }

    /// Changes a column's type. `None` when the dialect has no direct form.
    fn set_data_type(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        data_type: &str,
    ) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            self.qualified_name(schema, table),
            self.quote_identifier(column),
            data_type
        ))
    }

    /// Sets or drops NOT NULL. `None` when the dialect has no direct form.
    fn set_nullable(
        &self,
        schema: Option<&str>,
        table: &str,
        column: &str,
        nullable: bool,
    ) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
            self.qualified_name(schema, table),
            self.quote_identifier(column),
            if nullable { "DROP" } else { "SET" }
        ))
    }

    /// Sets or drops a column default. `None` when the dialect has no
    /// direct form.
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
            "ALTER TABLE {} ALTER COLUMN {} {}",
            self.qualified_name(schema, table),
            self.quote_identifier(column),
            action
        ))
    }

    /// `CREATE INDEX`.
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
            self.quote_identifier(name),
            self.qualified_name(schema, table),
            cols.join(", ")
        )
    }

    /// `DROP INDEX`.
    fn drop_index(&self, schema: Option<&str>, _table: &str, name: &str) -> String {
        format!("DROP INDEX {}", self.qualified_name(schema, name))
    }

    /// `CREATE DATABASE`.
    fn create_database(&self, name: &str) -> String {
        format!("CREATE DATABASE {}", self.quote_identifier(name))
    }

    /// `DROP DATABASE`.
    fn drop_database(&self, name: &str) -> String {
        format!("DROP DATABASE {}", self.quote_identifier(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str_aliases() {
        assert_eq!("postgres".parse::<DialectKind>().unwrap(), DialectKind::Postgresql);
        assert_eq!("CockroachDB".parse::<DialectKind>().unwrap(), DialectKind::Postgresql);
        assert_eq!("mariadb".parse::<DialectKind>().unwrap(), DialectKind::Mysql);
        assert_eq!("mssql".parse::<DialectKind>().unwrap(), DialectKind::Sqlserver);
        assert!("oracle".parse::<DialectKind>().is_err());
    }

    #[test]
    fn test_kind_deserialize_aliases() {
        let kind: DialectKind = serde_json::from_str("\"libsql\"").unwrap();
        assert_eq!(kind, DialectKind::Sqlite);
        let kind: DialectKind = serde_json::from_str("\"postgresql\"").unwrap();
        assert_eq!(kind, DialectKind::Postgresql);
    }

    #[test]
    fn test_every_kind_round_trips_through_its_adapter() {
        for kind in [
            DialectKind::Sqlite,
            DialectKind::Postgresql,
            DialectKind::Mysql,
            DialectKind::Sqlserver,
            DialectKind::Firebird,
            DialectKind::Generic,
        ] {
            assert_eq!(kind.dialect().kind(), kind);
            assert_eq!(kind.as_str().parse::<DialectKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(ParamStyle::Positional.placeholder(3), "?");
        assert_eq!(ParamStyle::Numbered.placeholder(3), "$3");
        assert_eq!(ParamStyle::Named.placeholder(3), "@P3");
    }

    #[test]
    fn test_default_quoting_escapes_quotes() {
        let d = GenericDialect::new();
        assert_eq!(d.quote_identifier("users"), "\"users\"");
        assert_eq!(d.quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(d.qualified_name(Some("s"), "t"), "\"s\".\"t\"");
    }

    #[test]
    fn test_column_definition() {
        let d = GenericDialect::new();
        let col = ColumnDef::new("active", "BOOLEAN")
            .not_null()
            .default(SqlValue::Bool(true));
        assert_eq!(
            d.column_definition(&col),
            "\"active\" BOOLEAN DEFAULT TRUE NOT NULL"
        );
    }
}
