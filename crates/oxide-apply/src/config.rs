//! Session configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dialect::DialectKind;
use crate::error::{ApplyError, Result};
use crate::guard::AccessMode;

/// Settings for one [`crate::session::Session`].
///
/// ```json
/// { "dialect": "postgres", "defaultSchema": "public", "readOnly": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Engine the session talks to.
    pub dialect: DialectKind,
    /// Schema for entries that name none. Falls back to the dialect
    /// default when unset.
    #[serde(default)]
    pub default_schema: Option<String>,
    /// Start in read-only mode.
    #[serde(default)]
    pub read_only: bool,
}

impl SessionConfig {
    /// Configuration for `dialect` with defaults.
    #[must_use]
    pub const fn new(dialect: DialectKind) -> Self {
        Self {
            dialect,
            default_schema: None,
            read_only: false,
        }
    }

    /// Sets the default schema.
    #[must_use]
    pub fn default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Initial access mode.
    #[must_use]
    pub const fn access_mode(&self) -> AccessMode {
        if self.read_only {
            AccessMode::ReadOnly
        } else {
            AccessMode::Normal
        }
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ApplyError::Config(e.to_string()))
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ApplyError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}
