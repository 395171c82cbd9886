//! Generic SQL dialect.

use super::{Capabilities, Dialect, DialectKind};

/// ANSI quoting and literals with no capabilities.
///
/// Used for engines nothing is known about: data changes still compile,
/// every structural operation is refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDialect;

impl GenericDialect {
    /// Creates a new generic dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Generic
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}
