//! Topic record schema migrations.
//!
//! Version 1 is the current layout. Documents without a `version` field are
//! the legacy `{topic: [[prompt, response, timestamp], ...]}` layout and are
//! lifted to version 1 on read; the next save writes them back upgraded.

use serde_json::{Map, Value};
use tracing::info;

use palaver_core::error::{PalaverError, Result};

use crate::record::{Exchange, TopicEntry, TopicRecord, DEFAULT_TOPIC, RECORD_VERSION};

/// Decode a topic record document of any known version.
pub fn decode_record(content: &str) -> Result<TopicRecord> {
    let value: Value = serde_json::from_str(content)?;
    let Value::Object(map) = value else {
        return Err(PalaverError::Storage(
            "topic record must be a JSON object".to_string(),
        ));
    };

    let version = map.get("version").cloned();
    let record = match version {
        None => {
            let record = migrate_legacy(map)?;
            info!(
                topics = record.topics.len(),
                active = %record.active_topic,
                "Migrated legacy topic record to v{}",
                RECORD_VERSION
            );
            record
        }
        Some(Value::Number(n)) if n.as_u64() == Some(u64::from(RECORD_VERSION)) => {
            serde_json::from_value(Value::Object(map))?
        }
        Some(other) => {
            return Err(PalaverError::Storage(format!(
                "unsupported topic record version: {other}"
            )));
        }
    };

    record.validate()?;
    Ok(record)
}

/// Legacy: topic name -> exchange triples, in creation order.
///
/// The active topic was never stored; `General` is taken when present,
/// otherwise the last topic in the document. An empty document becomes the
/// seeded record.
fn migrate_legacy(map: Map<String, Value>) -> Result<TopicRecord> {
    if map.is_empty() {
        return Ok(TopicRecord::seeded());
    }

    let mut topics = Vec::with_capacity(map.len());
    for (name, log) in map {
        let exchanges: Vec<Exchange> = serde_json::from_value(log).map_err(|e| {
            PalaverError::Storage(format!("legacy topic '{name}' is malformed: {e}"))
        })?;
        topics.push(TopicEntry { name, exchanges });
    }

    let active_topic = if topics.iter().any(|t| t.name == DEFAULT_TOPIC) {
        DEFAULT_TOPIC.to_string()
    } else {
        topics
            .last()
            .map(|t| t.name.clone())
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string())
    };

    Ok(TopicRecord {
        version: RECORD_VERSION,
        active_topic,
        topics,
    })
}
