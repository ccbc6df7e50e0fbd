//! The persisted shape of one user's topic history.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use palaver_core::error::{PalaverError, Result};

/// Current on-disk schema version.
pub const RECORD_VERSION: u32 = 1;

/// Topic every fresh store starts with.
pub const DEFAULT_TOPIC: &str = "General";

type ExchangeTriple = (String, String, NaiveDateTime);

/// One prompt/response pair, stamped with local time when it was appended.
///
/// Stored as a `[prompt, response, timestamp]` triple.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ExchangeTriple", into = "ExchangeTriple")]
pub struct Exchange {
    pub prompt: String,
    pub response: String,
    pub timestamp: NaiveDateTime,
}

impl Exchange {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
            timestamp,
        }
    }

    /// Characters counted against the history budget.
    pub fn weight(&self) -> usize {
        self.prompt.chars().count() + self.response.chars().count()
    }
}

impl From<ExchangeTriple> for Exchange {
    fn from((prompt, response, timestamp): ExchangeTriple) -> Self {
        Self {
            prompt,
            response,
            timestamp,
        }
    }
}

impl From<Exchange> for ExchangeTriple {
    fn from(exchange: Exchange) -> Self {
        (exchange.prompt, exchange.response, exchange.timestamp)
    }
}

/// A named topic and its exchange log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub name: String,
    #[serde(default)]
    pub exchanges: Vec<Exchange>,
}

/// Everything needed to rebuild a topic store: topics in creation order
/// plus the active pointer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub version: u32,
    pub active_topic: String,
    pub topics: Vec<TopicEntry>,
}

impl TopicRecord {
    /// A record holding only the empty default topic.
    pub fn seeded() -> Self {
        Self {
            version: RECORD_VERSION,
            active_topic: DEFAULT_TOPIC.to_string(),
            topics: vec![TopicEntry {
                name: DEFAULT_TOPIC.to_string(),
                exchanges: Vec::new(),
            }],
        }
    }

    /// Check the store invariants a loaded record must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.topics.is_empty() {
            return Err(PalaverError::Storage("topic record has no topics".to_string()));
        }
        let mut names = HashSet::new();
        for topic in &self.topics {
            if !names.insert(topic.name.as_str()) {
                return Err(PalaverError::Storage(format!(
                    "topic record has duplicate topic '{}'",
                    topic.name
                )));
            }
        }
        if !names.contains(self.active_topic.as_str()) {
            return Err(PalaverError::Storage(format!(
                "active topic '{}' is not in the record",
                self.active_topic
            )));
        }
        Ok(())
    }
}
