//! Per-user conversation engine: routes each incoming line to a command
//! handler or to the completion backend.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use palaver_core::config::ChatConfig;
use palaver_core::{ModelCatalog, QueryConfig};

use crate::commands::{CommandArgs, CommandFn};
use crate::completion::{CompletionClient, BOT_TOKEN, HUMAN_TOKEN};
use crate::error::{ChatError, ErrorKind};
use crate::parser::QueryParser;
use crate::registry::CommandRegistry;
use crate::topics::{calculate_history_depth, TopicStore};

// =============================================================================
// Settings and records
// =============================================================================

/// Knobs shared by every engine, taken from `[chat]` in the config file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Character budget for replayed history.
    pub history_word_limit: usize,
    /// Tokens reserved for history when bounding `max_tokens`.
    pub history_token_reserve: u32,
    /// Framing text placed before the replayed history.
    pub intro_message: String,
    pub error_log_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

impl From<&ChatConfig> for EngineSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            history_word_limit: config.history_word_limit,
            history_token_reserve: config.history_token_reserve,
            intro_message: config.intro_message.clone(),
            error_log_capacity: config.error_log_capacity.max(1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    AwaitingModelResponse,
}

/// A request that failed, kept for `/dev`.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorRecord {
    pub timestamp: NaiveDateTime,
    pub prompt: String,
    pub kind: ErrorKind,
    pub message: String,
}

// =============================================================================
// Engine
// =============================================================================

pub struct ConversationEngine {
    registry: Arc<CommandRegistry<CommandFn>>,
    parser: QueryParser,
    topics: TopicStore,
    query: QueryConfig,
    models: ModelCatalog,
    settings: EngineSettings,
    client: Box<dyn CompletionClient>,
    state: EngineState,
    errors: VecDeque<ErrorRecord>,
}

impl ConversationEngine {
    pub fn new(
        registry: Arc<CommandRegistry<CommandFn>>,
        topics: TopicStore,
        query: QueryConfig,
        models: ModelCatalog,
        settings: EngineSettings,
        client: Box<dyn CompletionClient>,
    ) -> Self {
        Self {
            registry,
            parser: QueryParser::new(),
            topics,
            query,
            models,
            settings,
            client,
            state: EngineState::Idle,
            errors: VecDeque::new(),
        }
    }

    /// Handle one message from the user and produce the reply text.
    ///
    /// Failures are appended to the error log before being returned.
    pub fn handle(&mut self, prompt: &str) -> Result<String, ChatError> {
        let result = if self.parser.is_command(prompt) {
            self.run_command(prompt)
        } else {
            self.chat_turn(prompt)
        };

        if let Err(e) = &result {
            warn!(kind = %e.kind(), error = %e, "Request failed");
            self.record_error(prompt, e);
        }
        result
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn registry(&self) -> &CommandRegistry<CommandFn> {
        &self.registry
    }

    pub fn topics(&self) -> &TopicStore {
        &self.topics
    }

    pub fn topics_mut(&mut self) -> &mut TopicStore {
        &mut self.topics
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query
    }

    pub fn models(&self) -> &ModelCatalog {
        &self.models
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Change the query configuration through its validated setters.
    ///
    /// `change` runs against a copy; the live config is replaced only when
    /// it returns `Ok`.
    pub fn update_query<F>(&mut self, change: F) -> Result<(), ChatError>
    where
        F: FnOnce(&mut QueryConfig, &ModelCatalog, u32) -> palaver_core::Result<()>,
    {
        let mut staged = self.query.clone();
        change(&mut staged, &self.models, self.settings.history_token_reserve)?;
        if staged != self.query {
            info!(
                model = %staged.model,
                max_tokens = staged.max_tokens,
                temperature = staged.temperature,
                top_p = staged.top_p,
                "Query config updated"
            );
        }
        self.query = staged;
        Ok(())
    }

    /// Most recent failures, newest last. `0` returns the whole log.
    pub fn recent_errors(&self, limit: usize) -> Vec<&ErrorRecord> {
        let skip = match limit {
            0 => 0,
            n => self.errors.len().saturating_sub(n),
        };
        self.errors.iter().skip(skip).collect()
    }

    /// The prompt sent to the backend for `prompt` on the active topic.
    pub fn build_prompt(&self, prompt: &str) -> String {
        let log = &self.topics.current().exchanges;
        let depth = calculate_history_depth(log, self.settings.history_word_limit);

        let mut augmented = self.settings.intro_message.clone();
        for exchange in &log[log.len() - depth..] {
            augmented.push_str(&format!(
                "{HUMAN_TOKEN}: {}\n{BOT_TOKEN}: {}\n",
                exchange.prompt, exchange.response
            ));
        }
        augmented.push_str(&format!("{HUMAN_TOKEN}: {prompt}\n"));
        debug!(depth, chars = augmented.len(), "Prompt assembled");
        augmented
    }

    // -- Private helpers --

    fn run_command(&mut self, raw: &str) -> Result<String, ChatError> {
        let parsed = self.parser.parse(raw)?;
        let handler = self.registry.resolve(&parsed.command)?;
        if !self.registry.is_active(&parsed.command)? {
            return Err(ChatError::Validation(format!(
                "command {} is disabled",
                parsed.command
            )));
        }

        let args = CommandArgs::from(parsed);
        debug!(command = args.command(), "Dispatching command");
        let reply = handler(self, &args)?;
        Ok(reply.unwrap_or_else(|| format!("Command {} finished successfully", args.command())))
    }

    /// The backend sees the trimmed text; the exchange keeps the raw input.
    fn chat_turn(&mut self, prompt: &str) -> Result<String, ChatError> {
        let trimmed = prompt.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Validation("message cannot be empty".to_string()));
        }

        let augmented = self.build_prompt(trimmed);
        self.state = EngineState::AwaitingModelResponse;
        let raw = self.client.complete(&augmented, &self.query);
        self.state = EngineState::Idle;

        let response = clean_response(&raw?);
        self.topics.append_exchange(prompt, &response, None)?;
        Ok(response)
    }

    fn record_error(&mut self, prompt: &str, error: &ChatError) {
        self.errors.push_back(ErrorRecord {
            timestamp: Local::now().naive_local(),
            prompt: prompt.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        });
        while self.errors.len() > self.settings.error_log_capacity.max(1) {
            self.errors.pop_front();
        }
    }
}

/// Trim the reply and drop a leading bot marker with its `:` and spacing.
fn clean_response(raw: &str) -> String {
    let text = raw.trim();
    match text.strip_prefix(BOT_TOKEN) {
        Some(rest) => rest
            .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
            .to_string(),
        None => text.to_string(),
    }
}
