use std::fmt;

/// Bucket change reported by the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Directory part of the object key; the entity ID. Empty for top-level keys.
    pub parent: String,
    pub filename: String,
    pub event: EventType,
}

impl Notification {
    /// Split an (already unescaped) object key into parent and filename.
    pub fn from_key(key: &str, event: EventType) -> Self {
        let (parent, filename) = match key.rsplit_once('/') {
            Some((parent, filename)) => (parent.to_string(), filename.to_string()),
            None => (String::new(), key.to_string()),
        };
        Self {
            parent,
            filename,
            event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    Created,
    Removed,
    Other(String),
}

impl EventType {
    pub fn from_event_name(name: &str) -> Self {
        if name.starts_with("s3:ObjectCreated:") {
            EventType::Created
        } else if name.starts_with("s3:ObjectRemoved:") {
            EventType::Removed
        } else {
            EventType::Other(name.to_string())
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Created => f.write_str("created"),
            EventType::Removed => f.write_str("removed"),
            EventType::Other(name) => f.write_str(name),
        }
    }
}
