//! Structural (schema-level) operations.

use serde::{Deserialize, Serialize};

use crate::changes::ChangeSet;
use crate::value::SqlValue;

/// Column definition used by [`AlterChange::AddColumn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Engine-specific type, e.g. `varchar(255)`.
    pub data_type: String,
    /// Whether the column accepts NULL.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Default value.
    #[serde(default)]
    pub default: Option<SqlValue>,
}

const fn default_true() -> bool {
    true
}

impl ColumnDef {
    /// Creates a nullable column without default.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: SqlValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// One change inside an `ALTER TABLE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AlterChange {
    /// Add a column.
    AddColumn {
        /// New column.
        column: ColumnDef,
    },
    /// Drop a column.
    DropColumn {
        /// Column name.
        column: String,
    },
    /// Rename a column.
    #[serde(rename_all = "camelCase")]
    RenameColumn {
        /// Current name.
        column: String,
        /// New name.
        new_name: String,
    },
    /// Change a column's type.
    #[serde(rename_all = "camelCase")]
    SetDataType {
        /// Column name.
        column: String,
        /// New engine-specific type.
        data_type: String,
    },
    /// Set or drop NOT NULL.
    SetNullable {
        /// Column name.
        column: String,
        /// Whether NULL becomes allowed.
        nullable: bool,
    },
    /// Set (`Some`) or drop (`None`) the default.
    SetDefault {
        /// Column name.
        column: String,
        /// New default.
        #[serde(default)]
        default: Option<SqlValue>,
    },
}

impl AlterChange {
    /// The existing column this change targets, if any.
    #[must_use]
    pub fn target_column(&self) -> Option<&str> {
        match self {
            Self::AddColumn { .. } => None,
            Self::DropColumn { column }
            | Self::RenameColumn { column, .. }
            | Self::SetDataType { column, .. }
            | Self::SetNullable { column, .. }
            | Self::SetDefault { column, .. } => Some(column),
        }
    }
}

/// A schema-level operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum StructuralOp {
    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
        /// Schema; the session default when absent.
        #[serde(default)]
        schema: Option<String>,
    },
    /// Remove every row of a table.
    TruncateTable {
        /// Table name.
        table: String,
        /// Schema; the session default when absent.
        #[serde(default)]
        schema: Option<String>,
    },
    /// Copy a table (structure and rows) under a new name.
    #[serde(rename_all = "camelCase")]
    DuplicateTable {
        /// Source table.
        table: String,
        /// Schema of both tables.
        #[serde(default)]
        schema: Option<String>,
        /// Name of the copy.
        new_name: String,
    },
    /// Rename a table.
    #[serde(rename_all = "camelCase")]
    RenameTable {
        /// Current name.
        table: String,
        /// Schema; the session default when absent.
        #[serde(default)]
        schema: Option<String>,
        /// New name.
        new_name: String,
    },
    /// Alter columns of a table.
    AlterTable {
        /// Table name.
        table: String,
        /// Schema; the session default when absent.
        #[serde(default)]
        schema: Option<String>,
        /// Column changes, applied in order.
        changes: Vec<AlterChange>,
    },
    /// Create an index.
    CreateIndex {
        /// Indexed table.
        table: String,
        /// Schema; the session default when absent.
        #[serde(default)]
        schema: Option<String>,
        /// Index name.
        name: String,
        /// Indexed columns, in order.
        columns: Vec<String>,
        /// Whether the index enforces uniqueness.
        #[serde(default)]
        unique: bool,
    },
    /// Drop an index.
    DropIndex {
        /// Table the index belongs to.
        table: String,
        /// Schema; the session default when absent.
        #[serde(default)]
        schema: Option<String>,
        /// Index name.
        name: String,
    },
    /// Create a database.
    CreateDatabase {
        /// Database name.
        name: String,
    },
    /// Drop a database.
    DropDatabase {
        /// Database name.
        name: String,
    },
}

impl StructuralOp {
    /// Short verb phrase used in logs and error messages.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::DropTable { .. } => "drop table",
            Self::TruncateTable { .. } => "truncate table",
            Self::DuplicateTable { .. } => "duplicate table",
            Self::RenameTable { .. } => "rename table",
            Self::AlterTable { .. } => "alter table",
            Self::CreateIndex { .. } => "create index",
            Self::DropIndex { .. } => "drop index",
            Self::CreateDatabase { .. } => "create database",
            Self::DropDatabase { .. } => "drop database",
        }
    }

    /// The existing table this operation targets, if any.
    #[must_use]
    pub fn target_table(&self) -> Option<(Option<&str>, &str)> {
        match self {
            Self::DropTable { table, schema }
            | Self::TruncateTable { table, schema }
            | Self::DuplicateTable { table, schema, .. }
            | Self::RenameTable { table, schema, .. }
            | Self::AlterTable { table, schema, .. }
            | Self::CreateIndex { table, schema, .. }
            | Self::DropIndex { table, schema, .. } => Some((schema.as_deref(), table)),
            Self::CreateDatabase { .. } | Self::DropDatabase { .. } => None,
        }
    }

    /// True for operations on whole databases.
    #[must_use]
    pub const fn is_database_level(&self) -> bool {
        matches!(self, Self::CreateDatabase { .. } | Self::DropDatabase { .. })
    }
}

/// The unit handed to the guard, compiler and executor.
///
/// A batch carries either row edits or structural operations; the compiler
/// refuses one that carries both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Batch {
    /// Row edits.
    #[serde(flatten)]
    pub changes: ChangeSet,
    /// Structural operations, in order.
    #[serde(default)]
    pub structural: Vec<StructuralOp>,
}

impl Batch {
    /// Returns true if the batch holds no work.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.structural.is_empty()
    }

    /// Returns true if running the batch would change anything.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !self.is_empty()
    }

    /// Short description used by the read-only guard and logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match (self.changes.is_empty(), self.structural.as_slice()) {
            (true, []) => String::from("apply an empty batch"),
            (false, []) => String::from("apply changes"),
            (true, [op]) => op.describe().to_string(),
            _ => String::from("apply structural changes"),
        }
    }
}

impl From<ChangeSet> for Batch {
    fn from(changes: ChangeSet) -> Self {
        Self {
            changes,
            structural: Vec::new(),
        }
    }
}

impl From<StructuralOp> for Batch {
    fn from(op: StructuralOp) -> Self {
        Self {
            changes: ChangeSet::default(),
            structural: vec![op],
        }
    }
}

impl From<Vec<StructuralOp>> for Batch {
    fn from(structural: Vec<StructuralOp>) -> Self {
        Self {
            changes: ChangeSet::default(),
            structural,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::DeleteOp;

    #[test]
    fn test_describe() {
        let op = StructuralOp::TruncateTable {
            table: "t".into(),
            schema: None,
        };
        assert_eq!(Batch::from(op).describe(), "truncate table");
        let changes = ChangeSet::new().delete(DeleteOp::new("t").key("id", 1));
        assert_eq!(Batch::from(changes).describe(), "apply changes");
    }

    #[test]
    fn test_deserialize_structural_ops() {
        let json = r#"{"structural": [
            {"op": "duplicateTable", "table": "users", "newName": "users_copy"},
            {"op": "alterTable", "table": "users", "changes": [
                {"type": "addColumn", "column": {"name": "age", "dataType": "integer"}},
                {"type": "renameColumn", "column": "name", "newName": "full_name"}
            ]}
        ]}"#;
        let batch: Batch = serde_json::from_str(json).unwrap();
        assert!(batch.changes.is_empty());
        assert_eq!(batch.structural.len(), 2);
        match &batch.structural[1] {
            StructuralOp::AlterTable { changes, .. } => {
                assert_eq!(
                    changes[0],
                    AlterChange::AddColumn {
                        column: ColumnDef::new("age", "integer")
                    }
                );
                assert_eq!(changes[1].target_column(), Some("name"));
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_database_level() {
        assert!(StructuralOp::CreateDatabase { name: "x".into() }.is_database_level());
        assert!(StructuralOp::CreateDatabase { name: "x".into() }
            .target_table()
            .is_none());
    }
}
