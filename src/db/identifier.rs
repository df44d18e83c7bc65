//! SQL identifiers
//!
//! Table and column names cannot be bound as statement parameters, so they
//! have to be spliced into SQL text. `Identifier` is the only way that
//! happens: construction rejects anything outside `[A-Za-z0-9_]`, and the
//! name is always emitted double-quoted.

use crate::error::{CrudError, CrudResult};
use std::fmt;

/// PostgreSQL truncates identifiers longer than NAMEDATALEN - 1 bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated table or column name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

/// Name of a target table
pub type TableName = Identifier;

impl Identifier {
    /// Validate `raw` as an identifier.
    ///
    /// # Errors
    /// Returns `CrudError::InvalidIdentifier` if `raw` is empty, too long, or
    /// contains anything other than ASCII letters, digits and underscores.
    pub fn parse(raw: &str) -> CrudResult<Self> {
        if raw.is_empty() {
            return Err(CrudError::InvalidIdentifier("empty name".to_string()));
        }
        if raw.len() > MAX_IDENTIFIER_LEN {
            return Err(CrudError::InvalidIdentifier(format!(
                "'{}' is longer than {} characters",
                raw, MAX_IDENTIFIER_LEN
            )));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CrudError::InvalidIdentifier(format!(
                "'{}' may only contain letters, digits and underscores",
                raw.escape_debug()
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Wrap a compile-time constant name without re-validating it
    pub(crate) fn from_static(raw: &'static str) -> Self {
        debug_assert!(Self::parse(raw).is_ok(), "invalid static identifier {}", raw);
        Self(raw.to_string())
    }

    /// The bare name, for display and for binding as a catalog parameter
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a double-quoted SQL identifier
    pub fn quoted(&self) -> String {
        // The character set rules out embedded quotes, so no escaping is needed.
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Identifier {
    type Err = CrudError;

    fn from_str(s: &str) -> CrudResult<Self> {
        Self::parse(s)
    }
}
