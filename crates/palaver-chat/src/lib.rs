//! Slash-command dispatch and topic-scoped chat history for Palaver.
//!
//! Parses `/command arg key=value` shorthand, resolves commands through a
//! typed registry, keeps each user's conversation split into named topics,
//! and assembles history-framed prompts for the completion backend.

pub mod commands;
pub mod completion;
pub mod engine;
pub mod error;
pub mod parser;
pub mod registry;
pub mod topics;

pub use commands::{default_registry, CommandArgs, CommandFn};
pub use completion::{CompletionClient, EchoCompletion};
pub use engine::{ConversationEngine, EngineSettings, EngineState, ErrorRecord};
pub use error::{ChatError, ErrorKind};
pub use parser::{Kwargs, ParsedQuery, QueryParser};
pub use registry::{CommandGroup, CommandRegistry};
pub use topics::{calculate_history_depth, random_seed_word, RenameOutcome, Topic, TopicStore};

pub use palaver_storage::{Exchange, DEFAULT_TOPIC};
