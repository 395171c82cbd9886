//! Row-level change requests.
//!
//! A [`ChangeSet`] is built per request (usually from user edits in a
//! table view), applied or rendered once, and dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{SqlValue, ToSqlValue};

/// Column name to value for one inserted row.
pub type RowData = BTreeMap<String, SqlValue>;

/// One column/value pair of a row's key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Key column.
    pub column: String,
    /// Value the row currently holds in that column.
    pub value: SqlValue,
}

impl KeyValue {
    /// Creates a key pair.
    pub fn new(column: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self {
            column: column.into(),
            value: value.to_sql_value(),
        }
    }
}

/// Inserts rows into one table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOp {
    /// Target table.
    pub table: String,
    /// Target schema; the session default when absent.
    #[serde(default)]
    pub schema: Option<String>,
    /// Rows to insert. Rows may populate different columns.
    #[serde(alias = "data")]
    pub rows: Vec<RowData>,
}

impl InsertOp {
    /// Creates an insert with no rows.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Adds a row given as column/value pairs.
    #[must_use]
    pub fn row<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToSqlValue,
    {
        self.rows.push(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_sql_value()))
                .collect(),
        );
        self
    }
}

/// Sets one column of one row.
///
/// Several columns of the same row are changed with several ops sharing
/// the same `primary_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOp {
    /// Target table.
    pub table: String,
    /// Target schema; the session default when absent.
    #[serde(default)]
    pub schema: Option<String>,
    /// Ordered key pairs identifying the row.
    #[serde(alias = "primaryKeys")]
    pub primary_key: Vec<KeyValue>,
    /// Column to write.
    pub column: String,
    /// New value.
    pub value: SqlValue,
}

impl UpdateOp {
    /// Creates an update of `column` to `value`, with an empty key.
    pub fn new(table: impl Into<String>, column: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self {
            table: table.into(),
            schema: None,
            primary_key: Vec::new(),
            column: column.into(),
            value: value.to_sql_value(),
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Adds a key pair.
    #[must_use]
    pub fn key(mut self, column: impl Into<String>, value: impl ToSqlValue) -> Self {
        self.primary_key.push(KeyValue::new(column, value));
        self
    }
}

/// Deletes one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOp {
    /// Target table.
    pub table: String,
    /// Target schema; the session default when absent.
    #[serde(default)]
    pub schema: Option<String>,
    /// Ordered key pairs identifying the row.
    #[serde(alias = "primaryKeys")]
    pub primary_key: Vec<KeyValue>,
}

impl DeleteOp {
    /// Creates a delete with an empty key.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: None,
            primary_key: Vec::new(),
        }
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Adds a key pair.
    #[must_use]
    pub fn key(mut self, column: impl Into<String>, value: impl ToSqlValue) -> Self {
        self.primary_key.push(KeyValue::new(column, value));
        self
    }
}

/// A batch of row edits applied as one atomic unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Inserts, in caller order.
    #[serde(default)]
    pub inserts: Vec<InsertOp>,
    /// Updates, in caller order.
    #[serde(default)]
    pub updates: Vec<UpdateOp>,
    /// Deletes, in caller order.
    #[serde(default)]
    pub deletes: Vec<DeleteOp>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an insert.
    #[must_use]
    pub fn insert(mut self, op: InsertOp) -> Self {
        self.inserts.push(op);
        self
    }

    /// Adds an update.
    #[must_use]
    pub fn update(mut self, op: UpdateOp) -> Self {
        self.updates.push(op);
        self
    }

    /// Adds a delete.
    #[must_use]
    pub fn delete(mut self, op: DeleteOp) -> Self {
        self.deletes.push(op);
        self
    }

    /// Returns true if the set holds no operation at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }

    /// Every `(schema, table)` the set touches, in first-seen order.
    pub fn tables(&self) -> impl Iterator<Item = (Option<&str>, &str)> {
        self.inserts
            .iter()
            .map(|op| (op.schema.as_deref(), op.table.as_str()))
            .chain(
                self.updates
                    .iter()
                    .map(|op| (op.schema.as_deref(), op.table.as_str())),
            )
            .chain(
                self.deletes
                    .iter()
                    .map(|op| (op.schema.as_deref(), op.table.as_str())),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let changes = ChangeSet::new()
            .insert(InsertOp::new("t").row([("id", 1), ("n", 2)]))
            .update(UpdateOp::new("t", "name", "Testy").key("id", 1))
            .delete(DeleteOp::new("t").schema("main").key("id", 2));

        assert_eq!(changes.len(), 3);
        assert_eq!(changes.inserts[0].rows[0]["id"], SqlValue::Int(1));
        assert_eq!(changes.updates[0].primary_key[0].column, "id");
        let tables: Vec<_> = changes.tables().collect();
        assert_eq!(tables, vec![(None, "t"), (None, "t"), (Some("main"), "t")]);
    }

    #[test]
    fn test_deserialize_with_original_field_names() {
        let json = r#"{
            "inserts": [
                {"table": "test_inserts", "schema": "main",
                 "data": [{"id": 1, "first_name": "Terry", "last_name": "Tester"}]}
            ],
            "updates": [
                {"table": "test_inserts",
                 "primaryKeys": [{"column": "id", "value": 1}],
                 "column": "first_name", "value": "Testy"}
            ],
            "deletes": [
                {"table": "test_inserts", "primaryKey": [{"column": "id", "value": 2}]}
            ]
        }"#;
        let changes: ChangeSet = serde_json::from_str(json).unwrap();
        assert_eq!(changes.inserts[0].rows.len(), 1);
        assert_eq!(changes.inserts[0].schema.as_deref(), Some("main"));
        assert_eq!(
            changes.updates[0].primary_key,
            vec![KeyValue::new("id", 1)]
        );
        assert_eq!(changes.updates[0].value, SqlValue::Text("Testy".into()));
        assert_eq!(changes.deletes[0].primary_key[0].value, SqlValue::Int(2));
    }

    #[test]
    fn test_missing_lists_default_to_empty() {
        let changes: ChangeSet = serde_json::from_str(r#"{"inserts": []}"#).unwrap();
        assert!(changes.is_empty());
    }
}
