//! Schema introspection through SQLite's table-valued pragmas.

use oxide_apply::dialect::SqliteDialect;
use oxide_apply::{ColumnMetadata, Dialect, DriverError, Introspect, TableMetadata};
use sqlx::Row;
use tracing::debug;

use crate::connection::SqliteConnection;
use crate::error::driver_error;

const DEFAULT_SCHEMA: &str = "main";

const TABLE_COLUMNS_SQL: &str = r#"
SELECT name, type, "notnull", dflt_value, pk, hidden
FROM pragma_table_xinfo(?, ?)
ORDER BY cid
"#;

const UNIQUE_INDEXES_SQL: &str = r#"
SELECT name FROM pragma_index_list(?, ?)
WHERE "unique" = 1 AND partial = 0
ORDER BY seq
"#;

const INDEX_COLUMNS_SQL: &str = "SELECT name FROM pragma_index_info(?, ?) ORDER BY seqno";

/// `hidden` values of `pragma_table_xinfo` for virtual and stored
/// generated columns.
const GENERATED_VIRTUAL: i64 = 2;
const GENERATED_STORED: i64 = 3;

impl SqliteConnection {
    async fn unique_keys(&mut self, schema: &str, table: &str) -> Result<Vec<Vec<String>>, DriverError> {
        let indexes = self
            .fetch_rows(sqlx::query(UNIQUE_INDEXES_SQL).bind(table).bind(schema))
            .await?;
        let mut keys = Vec::with_capacity(indexes.len());
        for index in indexes {
            let name: String = index.try_get("name").map_err(driver_error)?;
            let rows = self
                .fetch_rows(sqlx::query(INDEX_COLUMNS_SQL).bind(name.as_str()).bind(schema))
                .await?;
            let columns = rows
                .iter()
                .map(|row| row.try_get::<Option<String>, _>("name"))
                .collect::<Result<Option<Vec<String>>, _>>()
                .map_err(driver_error)?;
            // Expression indexes report NULL column names.
            if let Some(columns) = columns {
                keys.push(columns);
            }
        }
        Ok(keys)
    }
}

impl Introspect for SqliteConnection {
    async fn list_tables(&mut self, schema: Option<&str>) -> Result<Vec<TableMetadata>, DriverError> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let sql = format!(
            "SELECT name FROM {}.sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            SqliteDialect::new().quote_identifier(schema)
        );
        let rows = self.fetch_rows(sqlx::query(&sql)).await?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("name")
                    .map(|name| TableMetadata::named(Some(schema.to_string()), name))
                    .map_err(driver_error)
            })
            .collect()
    }

    async fn describe_table(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Option<TableMetadata>, DriverError> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        debug!(schema, table, "Describing table");
        let rows = self
            .fetch_rows(sqlx::query(TABLE_COLUMNS_SQL).bind(table).bind(schema))
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut meta = TableMetadata::named(Some(schema.to_string()), table);
        let mut primary_key: Vec<(i64, String)> = Vec::new();
        for row in &rows {
            let name: String = row.try_get("name").map_err(driver_error)?;
            let data_type: String = row.try_get("type").map_err(driver_error)?;
            let not_null: i64 = row.try_get("notnull").map_err(driver_error)?;
            let default: Option<String> = row.try_get("dflt_value").map_err(driver_error)?;
            let pk: i64 = row.try_get("pk").map_err(driver_error)?;
            let hidden: i64 = row.try_get("hidden").map_err(driver_error)?;

            if pk > 0 {
                primary_key.push((pk, name.clone()));
            }
            meta.columns.push(ColumnMetadata {
                name,
                data_type,
                nullable: not_null == 0,
                generated: matches!(hidden, GENERATED_VIRTUAL | GENERATED_STORED),
                default,
            });
        }
        primary_key.sort_by_key(|(position, _)| *position);
        meta.primary_key_columns = primary_key.into_iter().map(|(_, name)| name).collect();
        meta.unique_keys = self.unique_keys(schema, table).await?;
        Ok(Some(meta))
    }
}
