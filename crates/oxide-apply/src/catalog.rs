//! Schema catalog: cached table metadata for one connection.
//!
//! The catalog is a read-through cache keyed by `(schema, table)`. Reads
//! are served from the cache when possible; structural changes invalidate
//! the affected keys before the session reports success, so the next read
//! always goes back to the engine.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApplyError, DriverError, Result};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    /// Column name.
    pub name: String,
    /// Declared type, as reported by the engine.
    pub data_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Whether the engine computes the column's value.
    pub generated: bool,
    /// Default expression, as reported by the engine.
    pub default: Option<String>,
}

impl ColumnMetadata {
    /// Creates a nullable, non-generated column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            generated: false,
            default: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as generated.
    #[must_use]
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    /// Table name.
    pub name: String,
    /// Schema, if the engine has schemas.
    pub schema: Option<String>,
    /// Columns in declaration order.
    pub columns: Vec<ColumnMetadata>,
    /// Primary key columns in key order. Empty when the table has none.
    pub primary_key_columns: Vec<String>,
    /// Column sets of the table's full (non-partial) unique constraints.
    pub unique_keys: Vec<Vec<String>>,
}

impl TableMetadata {
    /// Metadata carrying only a name, as returned by table listings.
    pub fn named(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema,
            columns: Vec::new(),
            primary_key_columns: Vec::new(),
            unique_keys: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key.
    #[must_use]
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key_columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Adds a unique key.
    #[must_use]
    pub fn unique_key(mut self, columns: &[&str]) -> Self {
        self.unique_keys
            .push(columns.iter().map(|c| (*c).to_string()).collect());
        self
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn find_column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// `schema.table`, or just `table`.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.schema {
            Some(ref schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Whether equality on `columns` can match at most one row: the set
    /// must cover the primary key or one of the unique keys.
    #[must_use]
    pub fn identifies_single_row(&self, columns: &[&str]) -> bool {
        let covers = |key: &[String]| !key.is_empty() && key.iter().all(|k| columns.contains(&k.as_str()));
        covers(&self.primary_key_columns) || self.unique_keys.iter().any(|key| covers(key))
    }

    /// The cache key of this table.
    #[must_use]
    pub fn key(&self) -> TableKey {
        TableKey::new(self.schema.as_deref(), &self.name)
    }
}

/// Cache key: `(schema, table)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    /// Schema, if any.
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
}

impl TableKey {
    /// Creates a key.
    #[must_use]
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        }
    }
}

/// Reads schema information from a live connection.
#[allow(async_fn_in_trait)]
pub trait Introspect {
    /// Lists the tables of `schema` (the connection default when `None`).
    ///
    /// # Errors
    ///
    /// Returns the driver error when the listing query fails.
    async fn list_tables(
        &mut self,
        schema: Option<&str>,
    ) -> std::result::Result<Vec<TableMetadata>, DriverError>;

    /// Describes one table; `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the driver error when a metadata query fails.
    async fn describe_table(
        &mut self,
        schema: Option<&str>,
        table: &str,
    ) -> std::result::Result<Option<TableMetadata>, DriverError>;
}

/// An immutable set of table metadata handed to the compiler.
#[derive(Debug, Clone, Default)]
pub struct MetadataSnapshot {
    tables: HashMap<TableKey, Arc<TableMetadata>>,
}

impl MetadataSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table.
    pub fn insert(&mut self, table: impl Into<Arc<TableMetadata>>) {
        let table = table.into();
        self.tables.insert(table.key(), table);
    }

    /// Looks up a table.
    #[must_use]
    pub fn get(&self, schema: Option<&str>, table: &str) -> Option<&TableMetadata> {
        self.tables
            .get(&TableKey::new(schema, table))
            .map(AsRef::as_ref)
    }

    /// Number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if the snapshot holds no table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<TableMetadata> for MetadataSnapshot {
    fn from_iter<T: IntoIterator<Item = TableMetadata>>(iter: T) -> Self {
        let mut snapshot = Self::new();
        for table in iter {
            snapshot.insert(table);
        }
        snapshot
    }
}

/// Read-through metadata cache, owned by a session.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    cache: HashMap<TableKey, Arc<TableMetadata>>,
}

impl SchemaCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists tables. Listings are never cached.
    ///
    /// # Errors
    ///
    /// Returns `Catalog` when introspection fails.
    pub async fn list_tables<I: Introspect>(
        &self,
        conn: &mut I,
        schema: Option<&str>,
    ) -> Result<Vec<TableMetadata>> {
        conn.list_tables(schema)
            .await
            .map_err(|source| ApplyError::Catalog { source })
    }

    /// Returns a table's metadata, from cache when present.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the table does not exist and `Catalog` when
    /// introspection fails.
    pub async fn table_metadata<I: Introspect>(
        &mut self,
        conn: &mut I,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Arc<TableMetadata>> {
        self.fetch(conn, TableKey::new(schema, table))
            .await?
            .ok_or_else(|| ApplyError::table_not_found(display(schema, table)))
    }

    /// Resolves `keys` into a snapshot. Tables that do not exist are left
    /// out; the compiler reports them.
    ///
    /// # Errors
    ///
    /// Returns `Catalog` when introspection fails.
    pub async fn snapshot<I, K>(&mut self, conn: &mut I, keys: K) -> Result<MetadataSnapshot>
    where
        I: Introspect,
        K: IntoIterator<Item = TableKey>,
    {
        let mut snapshot = MetadataSnapshot::new();
        for key in keys {
            if snapshot.tables.contains_key(&key) {
                continue;
            }
            if let Some(table) = self.fetch(conn, key.clone()).await? {
                snapshot.tables.insert(key, table);
            }
        }
        Ok(snapshot)
    }

    /// Drops cached entries for `table`, or for the whole schema when
    /// `table` is `None`.
    pub fn invalidate(&mut self, schema: Option<&str>, table: Option<&str>) {
        match table {
            Some(table) => {
                self.cache.remove(&TableKey::new(schema, table));
            }
            None => self.cache.retain(|key, _| key.schema.as_deref() != schema),
        }
        debug!(schema = ?schema, table = ?table, "Catalog invalidated");
    }

    /// Drops every cached entry.
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
        debug!("Catalog cleared");
    }

    /// Whether `(schema, table)` is cached.
    #[must_use]
    pub fn is_cached(&self, schema: Option<&str>, table: &str) -> bool {
        self.cache.contains_key(&TableKey::new(schema, table))
    }

    /// Number of cached tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    async fn fetch<I: Introspect>(
        &mut self,
        conn: &mut I,
        key: TableKey,
    ) -> Result<Option<Arc<TableMetadata>>> {
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Some(Arc::clone(hit)));
        }
        debug!(schema = ?key.schema, table = %key.name, "Fetching table metadata");
        let fetched = conn
            .describe_table(key.schema.as_deref(), &key.name)
            .await
            .map_err(|source| ApplyError::Catalog { source })?;
        Ok(fetched.map(|mut table| {
            // Keep the key the caller asked for, so lookups hit.
            table.schema = key.schema.clone();
            let table = Arc::new(table);
            self.cache.insert(key, Arc::clone(&table));
            table
        }))
    }
}

fn display(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{schema}.{table}"),
        None => table.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DriverErrorKind, ErrorKind};

    #[derive(Default)]
    struct FakeIntrospector {
        tables: Vec<TableMetadata>,
        describe_calls: usize,
        fail: bool,
    }

    impl Introspect for FakeIntrospector {
        async fn list_tables(
            &mut self,
            schema: Option<&str>,
        ) -> std::result::Result<Vec<TableMetadata>, DriverError> {
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
        ) -> std::result::Result<Option<TableMetadata>, DriverError> {
            self.describe_calls += 1;
            if self.fail {
                return Err(DriverError::new(DriverErrorKind::ConnectionLost, "gone"));
            }
            Ok(self
                .tables
                .iter()
                .find(|t| t.schema.as_deref() == schema && t.name == table)
                .cloned())
        }
    }

    fn users() -> TableMetadata {
        TableMetadata::named(Some("main".into()), "users")
            .column(ColumnMetadata::new("id", "INTEGER").not_null())
            .column(ColumnMetadata::new("email", "TEXT"))
            .primary_key(&["id"])
            .unique_key(&["email"])
    }

    fn introspector() -> FakeIntrospector {
        FakeIntrospector {
            tables: vec![users()],
            ..FakeIntrospector::default()
        }
    }

    #[tokio::test]
    async fn test_metadata_is_cached() {
        let mut conn = introspector();
        let mut catalog = SchemaCatalog::new();

        let first = catalog
            .table_metadata(&mut conn, Some("main"), "users")
            .await
            .unwrap();
        let second = catalog
            .table_metadata(&mut conn, Some("main"), "users")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(conn.describe_calls, 1);
        assert!(catalog.is_cached(Some("main"), "users"));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let mut conn = introspector();
        let mut catalog = SchemaCatalog::new();

        catalog
            .table_metadata(&mut conn, Some("main"), "users")
            .await
            .unwrap();
        catalog.invalidate(Some("main"), Some("users"));
        assert!(catalog.is_empty());

        catalog
            .table_metadata(&mut conn, Some("main"), "users")
            .await
            .unwrap();
        assert_eq!(conn.describe_calls, 2);
    }

    #[tokio::test]
    async fn test_invalidate_schema_keeps_other_schemas() {
        let mut conn = FakeIntrospector {
            tables: vec![
                users(),
                TableMetadata::named(Some("aux".into()), "logs"),
            ],
            ..FakeIntrospector::default()
        };
        let mut catalog = SchemaCatalog::new();
        catalog
            .table_metadata(&mut conn, Some("main"), "users")
            .await
            .unwrap();
        catalog
            .table_metadata(&mut conn, Some("aux"), "logs")
            .await
            .unwrap();

        catalog.invalidate(Some("main"), None);

        assert!(!catalog.is_cached(Some("main"), "users"));
        assert!(catalog.is_cached(Some("aux"), "logs"));
    }

    #[tokio::test]
    async fn test_missing_table_is_not_found() {
        let mut conn = introspector();
        let mut catalog = SchemaCatalog::new();

        let err = catalog
            .table_metadata(&mut conn, Some("main"), "nope")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("main.nope"));
    }

    #[tokio::test]
    async fn test_snapshot_skips_missing_tables() {
        let mut conn = introspector();
        let mut catalog = SchemaCatalog::new();

        let snapshot = catalog
            .snapshot(
                &mut conn,
                [
                    TableKey::new(Some("main"), "users"),
                    TableKey::new(Some("main"), "users"),
                    TableKey::new(Some("main"), "nope"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(Some("main"), "users").is_some());
        assert_eq!(conn.describe_calls, 2);
    }

    #[tokio::test]
    async fn test_introspection_failure_keeps_kind() {
        let mut conn = FakeIntrospector {
            fail: true,
            ..introspector()
        };
        let mut catalog = SchemaCatalog::new();

        let err = catalog
            .table_metadata(&mut conn, Some("main"), "users")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConnectionLost);
    }

    #[tokio::test]
    async fn test_list_tables_is_live() {
        let mut conn = introspector();
        let catalog = SchemaCatalog::new();

        let tables = catalog.list_tables(&mut conn, Some("main")).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "users");
        assert!(tables[0].columns.is_empty());
        assert_eq!(conn.describe_calls, 0);
    }

    #[test]
    fn test_identifies_single_row() {
        let table = TableMetadata::named(None, "t")
            .column(ColumnMetadata::new("id1", "INTEGER"))
            .column(ColumnMetadata::new("id2", "INTEGER"))
            .column(ColumnMetadata::new("code", "TEXT"))
            .primary_key(&["id1", "id2"])
            .unique_key(&["code"]);

        assert!(table.identifies_single_row(&["id1", "id2"]));
        assert!(table.identifies_single_row(&["id2", "id1", "code"]));
        assert!(table.identifies_single_row(&["code"]));
        assert!(!table.identifies_single_row(&["id1"]));
        assert!(!table.identifies_single_row(&[]));

        let keyless = TableMetadata::named(None, "k").column(ColumnMetadata::new("a", "INT"));
        assert!(!keyless.identifies_single_row(&["a"]));
    }
}
