// ============================================================================
// Cache Entry and Outbound Message Types
// ============================================================================
//
// A CacheEntry is what the cache backend holds for one identifier. It is only
// usable when all three fields are present and non-empty.
//
// An OutboundMessage is built exactly once from a usable CacheEntry and is
// never mutated afterwards: the channel or queue it is handed to owns it.
// ============================================================================

use bytes::Bytes;
use std::fmt;

/// Attribute carrying the record identifier
pub const ATTRIBUTE_RECORD_ID: &str = "id";
/// Attribute carrying the record type
pub const ATTRIBUTE_RECORD_TYPE: &str = "type";
/// Attribute carrying the record source
pub const ATTRIBUTE_RECORD_SOURCE: &str = "source";
/// Attribute carrying the operation marker
pub const ATTRIBUTE_RECORD_OPERATION: &str = "operation";
/// Operation marker for re-published records
pub const OPERATION_UPDATE: &str = "update";

/// Required fields of a cache entry, in the order backends request them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheField {
    Type,
    Source,
    Payload,
}

impl CacheField {
    pub const ALL: [CacheField; 3] = [CacheField::Type, CacheField::Source, CacheField::Payload];

    /// Field / column name used by the cache backends
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheField::Type => "type",
            CacheField::Source => "source",
            CacheField::Payload => "payload",
        }
    }
}

impl fmt::Display for CacheField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub record_type: String,
    pub source: String,
    pub payload: Bytes,
}

impl CacheEntry {
    /// Assemble an entry from possibly-missing backend fields
    ///
    /// Returns the first missing (absent or empty) field on failure.
    pub fn from_fields(
        record_type: Option<String>,
        source: Option<String>,
        payload: Option<Bytes>,
    ) -> Result<Self, CacheField> {
        let record_type = record_type
            .filter(|v| !v.is_empty())
            .ok_or(CacheField::Type)?;
        let source = source.filter(|v| !v.is_empty()).ok_or(CacheField::Source)?;
        let payload = payload
            .filter(|v| !v.is_empty())
            .ok_or(CacheField::Payload)?;

        Ok(Self {
            record_type,
            source,
            payload,
        })
    }
}

/// Name/value attribute attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A hydrated message ready for the outbound queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    attributes: Vec<Attribute>,
    payload: Bytes,
}

impl OutboundMessage {
    pub fn new(attributes: Vec<Attribute>, payload: Bytes) -> Self {
        Self {
            attributes,
            payload,
        }
    }

    /// Build the "update" message for a cached record
    ///
    /// Attribute order is fixed: id, type, source, operation.
    pub fn update(id: &str, entry: CacheEntry) -> Self {
        let attributes = vec![
            Attribute::new(ATTRIBUTE_RECORD_ID, id),
            Attribute::new(ATTRIBUTE_RECORD_TYPE, entry.record_type),
            Attribute::new(ATTRIBUTE_RECORD_SOURCE, entry.source),
            Attribute::new(ATTRIBUTE_RECORD_OPERATION, OPERATION_UPDATE),
        ];

        Self {
            attributes,
            payload: entry.payload,
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Look up an attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// The record id attribute, if present
    pub fn record_id(&self) -> Option<&str> {
        self.attribute(ATTRIBUTE_RECORD_ID)
    }

    pub fn into_parts(self) -> (Vec<Attribute>, Bytes) {
        (self.attributes, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_complete_entry() {
        let entry =
            CacheEntry::from_fields(some("marc"), some("sirsi"), Some(Bytes::from("<xml/>")))
                .unwrap();
        assert_eq!(entry.record_type, "marc");
        assert_eq!(entry.payload, Bytes::from("<xml/>"));
    }

    #[test]
    fn test_empty_source_is_missing() {
        let result = CacheEntry::from_fields(some("marc"), some(""), Some(Bytes::from("x")));
        assert_eq!(result, Err(CacheField::Source));
    }

    #[test]
    fn test_absent_payload_is_missing() {
        let result = CacheEntry::from_fields(some("marc"), some("sirsi"), None);
        assert_eq!(result, Err(CacheField::Payload));
    }

    #[test]
    fn test_update_message_attributes() {
        let entry = CacheEntry {
            record_type: "marc".to_string(),
            source: "sirsi".to_string(),
            payload: Bytes::from("payload"),
        };
        let message = OutboundMessage::update("u1", entry);

        let names: Vec<&str> = message
            .attributes()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "type", "source", "operation"]);
        assert_eq!(message.record_id(), Some("u1"));
        assert_eq!(message.attribute(ATTRIBUTE_RECORD_OPERATION), Some("update"));
        assert_eq!(message.payload(), &Bytes::from("payload"));
    }
}
