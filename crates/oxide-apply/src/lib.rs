//! Dialect-aware change application for SQL databases.
//!
//! `oxide-apply` takes a structured description of row edits (inserts,
//! updates and deletes addressed by primary key) or schema operations (drop,
//! truncate, duplicate, rename and alter table, index and database
//! management), turns it into SQL for the target engine, and runs it as one
//! atomic unit. The same compiled statements back both execution and the
//! SQL preview, so what is shown is what runs.
//!
//! # Architecture
//!
//! - **Dialect** - Per-engine quoting, placeholders, literals, DDL and
//!   capability flags
//! - **Catalog** - Cached table metadata, invalidated after schema changes
//! - **Compiler** - Validates a batch and produces ordered statements
//! - **Executor** - Runs statements in one transaction, rolls back on failure
//! - **Guard** - Refuses writes on read-only connections
//! - **Session** - Wires the above around one connection
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_apply::prelude::*;
//! use oxide_apply_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::connect("sqlite::memory:").await?;
//! let mut session = Session::new(conn, SessionConfig::new(DialectKind::Sqlite));
//!
//! let changes = ChangeSet::new()
//!     .insert(InsertOp::new("users").row([("id", 1)]))
//!     .update(UpdateOp::new("users", "name", "Terry").key("id", 1));
//!
//! println!("{}", session.apply_changes_sql(changes.clone()).await?);
//! session.apply_changes(changes).await?;
//! ```

pub mod catalog;
pub mod changes;
pub mod compiler;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod guard;
pub mod render;
pub mod session;
pub mod structure;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{ColumnMetadata, Introspect, MetadataSnapshot, SchemaCatalog, TableKey, TableMetadata};
pub use changes::{ChangeSet, DeleteOp, InsertOp, KeyValue, RowData, UpdateOp};
pub use compiler::{compile, CompiledBatch, CompiledStatement, Phase, StatementOrigin};
pub use config::SessionConfig;
pub use dialect::{Capabilities, Dialect, DialectKind, ParamStyle};
pub use error::{ApplyError, DriverError, DriverErrorKind, ErrorKind, Result};
pub use executor::{
    CancelHandle, Connection, ExecutionResult, QueryResult, StatementRows, TransactionExecutor,
};
pub use guard::{AccessMode, ReadOnlyGuard};
pub use render::render;
pub use session::Session;
pub use structure::{AlterChange, Batch, ColumnDef, StructuralOp};
pub use value::{SqlValue, ToSqlValue};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::changes::{ChangeSet, DeleteOp, InsertOp, UpdateOp};
    pub use crate::config::SessionConfig;
    pub use crate::dialect::DialectKind;
    pub use crate::error::{ApplyError, ErrorKind, Result};
    pub use crate::session::Session;
    pub use crate::structure::{AlterChange, Batch, ColumnDef, StructuralOp};
    pub use crate::value::{SqlValue, ToSqlValue};
}
