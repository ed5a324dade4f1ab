// ============================================================================
// Inbound Notification Types
// ============================================================================
//
// An inbound queue message is an object store event: one or more manifest
// files were written to a bucket. Each referenced file becomes a
// Notification. The queue hands out a ReceiptHandle with the message; the
// message is only deleted through that handle once every file passed
// validation.
//
// Event layout (only the fields read here):
// {"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":"k","size":12}}}]}
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// One manifest file to download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub source_bucket: String,
    pub source_key: String,
    pub object_size: u64,
}

impl Notification {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, object_size: u64) -> Self {
        Self {
            source_bucket: bucket.into(),
            source_key: key.into(),
            object_size,
        }
    }

    /// Parse an object store event body into its notifications
    pub fn parse_event(body: &str) -> Result<Vec<Notification>, serde_json::Error> {
        let event: ObjectEvent = serde_json::from_str(body)?;

        Ok(event
            .records
            .into_iter()
            .map(|r| Notification {
                source_bucket: r.s3.bucket.name,
                source_key: r.s3.object.key,
                object_size: r.s3.object.size,
            })
            .collect())
    }

    /// Render notifications back into an event body (used by tooling and tests)
    pub fn to_event(notifications: &[Notification]) -> String {
        let event = ObjectEvent {
            records: notifications
                .iter()
                .map(|n| EventRecord {
                    s3: S3Entity {
                        bucket: BucketEntity {
                            name: n.source_bucket.clone(),
                        },
                        object: ObjectEntity {
                            key: n.source_key.clone(),
                            size: n.object_size,
                        },
                    },
                })
                .collect(),
        };

        // Serializing plain strings and integers cannot fail
        serde_json::to_string(&event).unwrap_or_default()
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_bucket, self.source_key)
    }
}

/// Handle used to delete an inbound message once it has been accepted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectEvent {
    #[serde(rename = "Records", default)]
    records: Vec<EventRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventRecord {
    s3: S3Entity,
}

#[derive(Debug, Serialize, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Serialize, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectEntity {
    key: String,
    #[serde(default)]
    size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_with_two_files() {
        let body = r#"{"Records":[
            {"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"ingest"},"object":{"key":"a/one.ids","size":120}}},
            {"s3":{"bucket":{"name":"ingest"},"object":{"key":"a/two.ids","size":7}}}
        ]}"#;

        let notifications = Notification::parse_event(body).unwrap();
        assert_eq!(
            notifications,
            vec![
                Notification::new("ingest", "a/one.ids", 120),
                Notification::new("ingest", "a/two.ids", 7),
            ]
        );
    }

    #[test]
    fn test_parse_event_without_records() {
        assert!(Notification::parse_event("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_event_rejects_garbage() {
        assert!(Notification::parse_event("not json").is_err());
    }

    #[test]
    fn test_event_rendering_parses_back() {
        let original = vec![Notification::new("b", "k", 3)];
        let body = Notification::to_event(&original);
        assert_eq!(Notification::parse_event(&body).unwrap(), original);
    }
}
