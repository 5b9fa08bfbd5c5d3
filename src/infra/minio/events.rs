//! Decoding of Minio bucket notification records.

use serde::Deserialize;
use tracing::warn;

use crate::domain::{EventType, Notification};

#[derive(Debug, Deserialize)]
struct EventBatch {
    #[serde(rename = "Records", default)]
    records: Option<Vec<EventRecord>>,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    #[serde(rename = "eventName", default)]
    event_name: String,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

/// Decode one line of the notification stream. Blank keep-alive lines yield
/// nothing; undecodable lines and malformed keys are logged and skipped.
pub(crate) fn decode_line(line: &[u8]) -> Vec<Notification> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Vec::new();
    }

    let batch: EventBatch = match serde_json::from_slice(line) {
        Ok(batch) => batch,
        Err(err) => {
            warn!(error = %err, "Skipping undecodable bucket notification");
            return Vec::new();
        }
    };

    batch
        .records
        .unwrap_or_default()
        .into_iter()
        .filter_map(|record| match unescape_key(&record.s3.object.key) {
            Ok(key) => Some(Notification::from_key(
                &key,
                EventType::from_event_name(&record.event_name),
            )),
            Err(err) => {
                warn!(
                    key = %record.s3.object.key,
                    error = %err,
                    "Skipping notification with malformed object key"
                );
                None
            }
        })
        .collect()
}

/// Query-style unescape: `+` is a space, `%XX` is a byte.
fn unescape_key(key: &str) -> Result<String, std::string::FromUtf8Error> {
    urlencoding::decode(&key.replace('+', " ")).map(|decoded| decoded.into_owned())
}
