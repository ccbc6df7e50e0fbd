//! Topic-scoped conversation history for one user.
//!
//! A [`TopicStore`] keeps topics in creation order with exactly one active
//! topic, and writes the whole record through its backend after every
//! mutation. A mutation whose write fails is undone before the error is
//! returned.

use chrono::{Local, NaiveDate};
use tracing::{debug, info};
use rand::Rng;

use palaver_storage::{Exchange, TopicBackend, TopicEntry, TopicRecord, RECORD_VERSION};

use crate::error::ChatError;

// =============================================================================
// Types
// =============================================================================

/// A named conversation thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub exchanges: Vec<Exchange>,
}

impl Topic {
    fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exchanges: Vec::new(),
        }
    }
}

/// Result of a rename, used to phrase the reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameOutcome {
    pub old: String,
    pub new: String,
    pub was_active: bool,
}

impl RenameOutcome {
    pub fn message(&self) -> String {
        if self.was_active {
            format!("Active topic renamed from {} to {}", self.old, self.new)
        } else {
            format!("Topic {} renamed to {}", self.old, self.new)
        }
    }
}

/// Words used to tell sessions apart in generated topic names.
const SEED_WORDS: &[&str] = &[
    "amber", "anchor", "aspen", "badger", "beacon", "birch", "cactus", "canyon", "cedar",
    "comet", "coral", "cricket", "delta", "ember", "falcon", "fern", "fjord", "glacier",
    "harbor", "heron", "iris", "juniper", "kestrel", "lantern", "lichen", "lotus", "maple",
    "meadow", "nebula", "otter", "pebble", "pine", "quartz", "raven", "saffron", "sparrow",
    "tundra", "velvet", "willow", "zephyr",
];

/// Pick a random seed word for this session's generated topic names.
pub fn random_seed_word() -> &'static str {
    let mut rng = rand::rng();
    SEED_WORDS[rng.random_range(0..SEED_WORDS.len())]
}

/// How many of the most recent exchanges fit in `budget` characters.
///
/// The budget is checked before each exchange is added, so the exchange
/// that crosses it is still counted; a non-empty log always yields at
/// least 1.
pub fn calculate_history_depth(log: &[Exchange], budget: usize) -> usize {
    let mut depth = 0;
    let mut total = 0;
    while total <= budget && depth < log.len() {
        total += log[log.len() - 1 - depth].weight();
        depth += 1;
    }
    depth
}

// =============================================================================
// TopicStore
// =============================================================================

pub struct TopicStore {
    topics: Vec<Topic>,
    /// Index into `topics`; stays valid because topics are never removed.
    active: usize,
    backend: Box<dyn TopicBackend>,
    seed: String,
    counter: u32,
}

impl std::fmt::Debug for TopicStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicStore")
            .field("topics", &self.topics.len())
            .field("active", &self.current().name)
            .field("seed", &self.seed)
            .field("counter", &self.counter)
            .finish()
    }
}

impl TopicStore {
    /// Restore the store from `backend`, or start with an empty `General`
    /// topic if nothing was saved yet.
    pub fn load(backend: Box<dyn TopicBackend>, seed: impl Into<String>) -> Result<Self, ChatError> {
        let record = match backend.load()? {
            Some(record) => record,
            None => TopicRecord::seeded(),
        };

        let active = record
            .topics
            .iter()
            .position(|t| t.name == record.active_topic)
            .ok_or_else(|| {
                ChatError::Storage(format!(
                    "active topic '{}' missing from record",
                    record.active_topic
                ))
            })?;
        let topics: Vec<Topic> = record
            .topics
            .into_iter()
            .map(|entry| Topic {
                name: entry.name,
                exchanges: entry.exchanges,
            })
            .collect();

        let seed = seed.into();
        info!(
            topics = topics.len(),
            active = %topics[active].name,
            seed = %seed,
            "Topic store loaded"
        );
        Ok(Self {
            topics,
            active,
            backend,
            seed,
            counter: 0,
        })
    }

    /// Write the full record through the backend.
    pub fn persist(&self) -> Result<(), ChatError> {
        self.backend.save(&self.to_record())?;
        Ok(())
    }

    pub fn to_record(&self) -> TopicRecord {
        TopicRecord {
            version: RECORD_VERSION,
            active_topic: self.current().name.clone(),
            topics: self
                .topics
                .iter()
                .map(|t| TopicEntry {
                    name: t.name.clone(),
                    exchanges: t.exchanges.clone(),
                })
                .collect(),
        }
    }

    pub fn current(&self) -> &Topic {
        &self.topics[self.active]
    }

    pub fn get(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Name `create(None)` would use today.
    pub fn next_generated_name(&self) -> String {
        self.generated_name_for(Local::now().date_naive())
    }

    fn generated_name_for(&self, date: NaiveDate) -> String {
        self.free_generated_slot(date).1
    }

    /// First counter value at or past `self.counter` whose name is unused.
    /// A reloaded record may already hold names from an earlier session
    /// that drew the same seed.
    fn free_generated_slot(&self, date: NaiveDate) -> (u32, String) {
        let stamp = date.format("%y%b%d");
        let mut counter = self.counter;
        loop {
            let name = format!("{stamp}-{}-{counter}", self.seed);
            if self.position(&name).is_none() {
                return (counter, name);
            }
            counter += 1;
        }
    }

    /// Add an empty topic and make it active.
    pub fn create(&mut self, name: Option<&str>) -> Result<&Topic, ChatError> {
        let (slot, name) = match name {
            Some(name) => (self.counter, name.trim().to_string()),
            None => self.free_generated_slot(Local::now().date_naive()),
        };
        if name.is_empty() {
            return Err(ChatError::Validation("topic name cannot be empty".to_string()));
        }
        if self.position(&name).is_some() {
            return Err(ChatError::Validation(format!("topic '{name}' already exists")));
        }

        let previous = self.active;
        self.topics.push(Topic::empty(name));
        self.active = self.topics.len() - 1;
        if let Err(e) = self.persist() {
            self.topics.pop();
            self.active = previous;
            return Err(e);
        }

        self.counter = slot + 1;
        info!(topic = %self.current().name, total = self.topics.len(), "Topic created");
        Ok(self.current())
    }

    /// The `limit` most recently created topic names, oldest first.
    /// `0` lists all of them.
    pub fn list(&self, limit: usize) -> Vec<&str> {
        let start = match limit {
            0 => 0,
            n => self.topics.len().saturating_sub(n),
        };
        self.topics[start..].iter().map(|t| t.name.as_str()).collect()
    }

    /// Make another topic active.
    ///
    /// `name` is tried as an exact name, then as a substring matching exactly
    /// one topic (case-sensitive, then case-insensitive), then as an index.
    /// `index` counts back from the newest topic, starting at 1.
    pub fn switch(&mut self, name: Option<&str>, index: Option<usize>) -> Result<&Topic, ChatError> {
        let mut index = index;
        if let Some(name) = name {
            match self.match_name(name) {
                Some(pos) => return self.activate(pos),
                None => match name.trim().parse::<usize>() {
                    Ok(n) => index = Some(n),
                    Err(_) => return Err(ChatError::not_found("topic", name)),
                },
            }
        }

        match index {
            Some(n) if (1..=self.topics.len()).contains(&n) => self.activate(self.topics.len() - n),
            Some(n) => Err(ChatError::not_found("topic index", n.to_string())),
            None => Err(ChatError::Validation(
                "switching topics needs a topic name or an index".to_string(),
            )),
        }
    }

    /// Give a topic a new name without moving it.
    ///
    /// `target` defaults to the active topic.
    pub fn rename(&mut self, new_name: &str, target: Option<&str>) -> Result<RenameOutcome, ChatError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(ChatError::Validation("topic name cannot be empty".to_string()));
        }
        if self.position(new_name).is_some() {
            return Err(ChatError::Validation(format!(
                "topic name '{new_name}' is already taken"
            )));
        }
        let pos = match target {
            Some(target) => self
                .position(target)
                .ok_or_else(|| ChatError::not_found("topic", target))?,
            None => self.active,
        };

        let old = std::mem::replace(&mut self.topics[pos].name, new_name.to_string());
        if let Err(e) = self.persist() {
            self.topics[pos].name = old;
            return Err(e);
        }

        let outcome = RenameOutcome {
            old,
            new: new_name.to_string(),
            was_active: pos == self.active,
        };
        info!(old = %outcome.old, new = %outcome.new, active = outcome.was_active, "Topic renamed");
        Ok(outcome)
    }

    /// Record one exchange, stamped now, on `topic` or the active topic.
    pub fn append_exchange(&mut self, prompt: &str, response: &str, topic: Option<&str>) -> Result<&Exchange, ChatError> {
        let pos = self.resolve_topic(topic)?;
        let exchange = Exchange::new(prompt, response, Local::now().naive_local());

        self.topics[pos].exchanges.push(exchange);
        if let Err(e) = self.persist() {
            self.topics[pos].exchanges.pop();
            return Err(e);
        }

        let log = &self.topics[pos].exchanges;
        debug!(topic = %self.topics[pos].name, exchanges = log.len(), "Exchange appended");
        Ok(&log[log.len() - 1])
    }

    /// The last `limit` exchanges of `topic` (or the active topic), oldest
    /// first. `0` returns the whole log.
    pub fn history(&self, topic: Option<&str>, limit: usize) -> Result<&[Exchange], ChatError> {
        let log = &self.topics[self.resolve_topic(topic)?].exchanges;
        let start = match limit {
            0 => 0,
            n => log.len().saturating_sub(n),
        };
        Ok(&log[start..])
    }

    // -- Private helpers --

    fn position(&self, name: &str) -> Option<usize> {
        self.topics.iter().position(|t| t.name == name)
    }

    fn resolve_topic(&self, topic: Option<&str>) -> Result<usize, ChatError> {
        match topic {
            Some(name) => self
                .position(name)
                .ok_or_else(|| ChatError::not_found("topic", name)),
            None => Ok(self.active),
        }
    }

    /// Exact name, then a unique case-sensitive substring, then a unique
    /// case-insensitive substring. Ambiguity is never resolved here.
    fn match_name(&self, query: &str) -> Option<usize> {
        if let Some(pos) = self.position(query) {
            return Some(pos);
        }
        let unique = |hits: Vec<usize>| (hits.len() == 1).then(|| hits[0]);

        let sensitive: Vec<usize> = self
            .topics
            .iter()
            .enumerate()
            .filter(|(_, t)| t.name.contains(query))
            .map(|(i, _)| i)
            .collect();
        if let Some(pos) = unique(sensitive) {
            return Some(pos);
        }

        let lowered = query.to_lowercase();
        let insensitive: Vec<usize> = self
            .topics
            .iter()
            .enumerate()
            .filter(|(_, t)| t.name.to_lowercase().contains(&lowered))
            .map(|(i, _)| i)
            .collect();
        unique(insensitive)
    }

    fn activate(&mut self, pos: usize) -> Result<&Topic, ChatError> {
        let previous = std::mem::replace(&mut self.active, pos);
        if let Err(e) = self.persist() {
            self.active = previous;
            return Err(e);
        }
        info!(topic = %self.current().name, "Active topic switched");
        Ok(self.current())
    }
}
