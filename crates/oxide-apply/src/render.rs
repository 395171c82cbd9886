//! SQL preview rendering.

use crate::catalog::MetadataSnapshot;
use crate::compiler::{compile, CompiledBatch};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::structure::Batch;

/// Compiles a batch and returns its literal-inlined SQL.
///
/// The text is exactly what [`crate::executor::TransactionExecutor`] would
/// run, with parameters substituted. Nothing is executed.
///
/// # Errors
///
/// Returns the same validation errors as [`compile`].
pub fn render(
    batch: &Batch,
    dialect: &dyn Dialect,
    metadata: &MetadataSnapshot,
    default_schema: Option<&str>,
) -> Result<String> {
    Ok(render_compiled(&compile(batch, dialect, metadata, default_schema)?))
}

/// Joins the previews of an already compiled batch, one statement per line.
#[must_use]
pub fn render_compiled(batch: &CompiledBatch) -> String {
    batch
        .statements
        .iter()
        .map(|s| format!("{};", s.preview))
        .collect::<Vec<_>>()
        .join("\n")
}
