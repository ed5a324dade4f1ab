// ============================================================================
// Record Identifier Module
// ============================================================================
//
// A record identifier is one line of a manifest file. It is opaque to the
// pipeline except for two checks applied when it is parsed:
// 1. it must not be empty
// 2. its first character must match the cache backend's sentinel letter
//
// Once constructed an Identifier is immutable.
// ============================================================================

use std::fmt;

/// Sentinel letter used by the cache backends shipped with this service
pub const DEFAULT_IDENTIFIER_SENTINEL: char = 'u';

/// Shape constraint an identifier must satisfy for a given cache backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierShape {
    pub sentinel: char,
}

impl IdentifierShape {
    pub const fn new(sentinel: char) -> Self {
        Self { sentinel }
    }

    /// Check whether a raw (already trimmed) identifier matches this shape
    pub fn accepts(&self, raw: &str) -> bool {
        raw.chars().next() == Some(self.sentinel)
    }
}

impl Default for IdentifierShape {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTIFIER_SENTINEL)
    }
}

/// Opaque key naming one cached record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Parse a manifest line into an Identifier
    ///
    /// The caller is expected to have removed the line terminator already.
    ///
    /// # Examples
    /// ```
    /// use reprocess_types::{Identifier, IdentifierShape};
    ///
    /// let shape = IdentifierShape::default();
    /// assert!(Identifier::parse("u1234", shape).is_ok());
    /// assert!(Identifier::parse("bad-id", shape).is_err());
    /// ```
    pub fn parse(raw: &str, shape: IdentifierShape) -> Result<Self, IdentifierError> {
        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }

        if !shape.accepts(raw) {
            return Err(IdentifierError::BadShape {
                id: raw.to_string(),
                sentinel: shape.sentinel,
            });
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
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

/// Errors that can occur when parsing an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    Empty,
    BadShape { id: String, sentinel: char },
}

impl fmt::Display for IdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierError::Empty => write!(f, "record identifier is empty"),
            IdentifierError::BadShape { id, sentinel } => write!(
                f,
                "record identifier '{}' does not start with '{}'",
                id, sentinel
            ),
        }
    }
}

impl std::error::Error for IdentifierError {}
