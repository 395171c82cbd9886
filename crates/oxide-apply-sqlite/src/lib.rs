//! SQLite connection provider for `oxide-apply`.
//!
//! [`SqliteConnection`] implements [`oxide_apply::Connection`] and
//! [`oxide_apply::Introspect`] on top of a `sqlx` pool. Schema metadata comes
//! from the table-valued pragmas `pragma_table_xinfo`, `pragma_index_list`
//! and `pragma_index_info`, which also report generated columns.
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_apply::prelude::*;
//! use oxide_apply_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::connect("sqlite://app.db").await?;
//! let mut session = Session::new(conn, SessionConfig::new(DialectKind::Sqlite));
//! for table in session.list_tables(None).await? {
//!     println!("{}", table.name);
//! }
//! ```

mod connection;
mod error;
mod introspect;

pub use connection::SqliteConnection;
pub use error::driver_error;
