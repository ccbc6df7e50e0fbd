//! Built-in slash commands and argument binding.
//!
//! Handlers receive raw string arguments. [`CommandArgs::bind`] maps them
//! onto named parameters the way a keyword-capable call would: positionals
//! fill parameters left to right, keywords fill them by name.

use std::str::FromStr;

use palaver_storage::Exchange;

use crate::completion::{BOT_TOKEN, HUMAN_TOKEN};
use crate::engine::ConversationEngine;
use crate::error::ChatError;
use crate::parser::{Kwargs, ParsedQuery};
use crate::registry::{CommandGroup, CommandRegistry};

/// Typed command handler. `Ok(None)` means "done, nothing to report".
pub type CommandFn = fn(&mut ConversationEngine, &CommandArgs) -> Result<Option<String>, ChatError>;

const DEFAULT_LIST_LIMIT: usize = 10;
const DEFAULT_HISTORY_LIMIT: usize = 10;
const DEFAULT_ERROR_LIMIT: usize = 5;

// =============================================================================
// Argument binding
// =============================================================================

/// Arguments of one command invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandArgs {
    command: String,
    args: Vec<String>,
    kwargs: Kwargs,
}

impl From<ParsedQuery> for CommandArgs {
    fn from(query: ParsedQuery) -> Self {
        Self {
            command: query.command,
            args: query.args,
            kwargs: query.kwargs,
        }
    }
}

impl CommandArgs {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn positional(&self) -> &[String] {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Bind the raw arguments to `params`.
    ///
    /// Too many positionals, an unknown keyword, or a parameter given both
    /// ways is a validation error.
    pub fn bind(&self, params: &[&'static str]) -> Result<Bound<'_>, ChatError> {
        if self.args.len() > params.len() {
            return Err(ChatError::Validation(format!(
                "{} takes at most {} positional argument(s), got {}",
                self.command,
                params.len(),
                self.args.len()
            )));
        }

        let mut values: Vec<(&'static str, Option<&str>)> = params.iter().map(|p| (*p, None)).collect();
        for (slot, arg) in values.iter_mut().zip(&self.args) {
            slot.1 = Some(arg.as_str());
        }
        for (key, value) in self.kwargs.iter() {
            let slot = values
                .iter_mut()
                .find(|(name, _)| *name == key)
                .ok_or_else(|| {
                    ChatError::Validation(format!(
                        "{} got an unexpected argument '{key}'",
                        self.command
                    ))
                })?;
            if slot.1.is_some() {
                return Err(ChatError::Validation(format!(
                    "{} got multiple values for argument '{key}'",
                    self.command
                )));
            }
            slot.1 = Some(value);
        }

        Ok(Bound {
            command: &self.command,
            values,
        })
    }
}

/// Arguments bound to parameter names.
#[derive(Debug)]
pub struct Bound<'a> {
    command: &'a str,
    values: Vec<(&'static str, Option<&'a str>)>,
}

impl<'a> Bound<'a> {
    pub fn optional(&self, name: &str) -> Option<&'a str> {
        self.values
            .iter()
            .find(|(param, _)| *param == name)
            .and_then(|(_, value)| *value)
    }

    pub fn required(&self, name: &str) -> Result<&'a str, ChatError> {
        self.optional(name).ok_or_else(|| {
            ChatError::Validation(format!(
                "{} is missing required argument '{name}'",
                self.command
            ))
        })
    }

    /// Coerce an optional argument, naming the parameter on failure.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ChatError> {
        self.optional(name)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|_| {
                    ChatError::Validation(format!(
                        "{} argument '{name}' expects {}, got '{raw}'",
                        self.command,
                        type_label::<T>()
                    ))
                })
            })
            .transpose()
    }

    pub fn parse_required<T: FromStr>(&self, name: &str) -> Result<T, ChatError> {
        self.required(name)?;
        self.parse(name)?
            .ok_or_else(|| ChatError::Validation(format!("{} is missing '{name}'", self.command)))
    }
}

fn type_label<T>() -> &'static str {
    match std::any::type_name::<T>() {
        "usize" | "u32" | "u64" => "a non-negative integer",
        "f64" | "f32" => "a number",
        "bool" => "true or false",
        _ => "a valid value",
    }
}

// =============================================================================
// Registry
// =============================================================================

/// The registry every engine shares, with all built-in commands.
pub fn default_registry() -> CommandRegistry<CommandFn> {
    let mut registry: CommandRegistry<CommandFn> = CommandRegistry::new();

    registry.register(
        &["/help"],
        CommandGroup::Basic,
        true,
        "List available commands. Use /help {command} for full documentation.",
        help,
    );

    registry.register(
        &["/new_chat", "/new_topic"],
        CommandGroup::Topics,
        true,
        "Start a new topic and make it active.
         Usage: /new_topic [name]
         Without a name, one is generated from today's date and a session word.",
        new_topic,
    );
    registry.register(
        &["/chats", "/topics"],
        CommandGroup::Topics,
        true,
        "List recent topics.
         Usage: /topics [limit]
         Numbers are the index accepted by /switch_topic; 1 is the newest. Default limit 10, 0 for all.",
        list_topics,
    );
    registry.register(
        &["/switch_chat", "/switch_topic"],
        CommandGroup::Topics,
        true,
        "Switch to another topic by name, unique name fragment, or index.
         Usage: /switch_topic [name] [index=N]",
        switch_topic,
    );
    registry.register(
        &["/rename_chat", "/rename_topic"],
        CommandGroup::Topics,
        true,
        "Rename a topic.
         Usage: /rename_topic new_name [target=old name]
         Renames the active topic unless a target is given.",
        rename_topic,
    );
    registry.register(
        &["/history"],
        CommandGroup::Topics,
        true,
        "Show recent messages.
         Usage: /history [topic=name] [limit=N]
         Defaults to the active topic and the last 10 exchanges; limit=0 shows all.",
        history,
    );
    registry.register(
        &["/active_topic"],
        CommandGroup::Topics,
        true,
        "Show the active topic.",
        active_topic,
    );

    registry.register(
        &["/list_models"],
        CommandGroup::Model,
        true,
        "List the models you can switch to.",
        list_models,
    );
    registry.register(
        &["/switch_model", "/model"],
        CommandGroup::Model,
        true,
        "Switch the completion model.
         Usage: /model model_id",
        switch_model,
    );
    registry.register(
        &["/active_model"],
        CommandGroup::Model,
        true,
        "Show the active model.",
        active_model,
    );
    registry.register(
        &["/set_max_tokens"],
        CommandGroup::Model,
        true,
        "Set the maximum response length in tokens.
         Usage: /set_max_tokens N
         N must leave room for replayed history within the model's context window.",
        set_max_tokens,
    );
    registry.register(
        &["/set_temperature"],
        CommandGroup::Model,
        true,
        "Set sampling temperature, from 0 to 1.
         Usage: /set_temperature T",
        set_temperature,
    );
    registry.register(
        &["/set_top_p"],
        CommandGroup::Model,
        true,
        "Set nucleus sampling top-p, from 0 to 1.
         Usage: /set_top_p P",
        set_top_p,
    );
    registry.register(
        &["/set"],
        CommandGroup::Model,
        true,
        "Set query parameters by name.
         Usage: /set key=value [key=value ...]
         Keys: model, max_tokens, temperature, top_p, n, stream, stop, user.
         Either every update applies or none does.",
        set_params,
    );
    registry.register(
        &["/config"],
        CommandGroup::Model,
        true,
        "Show the current query parameters.",
        show_config,
    );

    registry.register(
        &["/dev", "/errors"],
        CommandGroup::Dev,
        true,
        "Show recent failed requests.
         Usage: /errors [limit]",
        recent_errors,
    );

    registry
}

// =============================================================================
// Handlers
// =============================================================================

fn help(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["command"])?;
    let registry = engine.registry();
    match bound.optional("command") {
        None => Ok(Some(format!("Available commands:\n{}", registry.help_text()))),
        Some(name) => {
            let alias = if name.starts_with('/') {
                name.to_string()
            } else {
                format!("/{name}")
            };
            Ok(Some(format!("{alias}\n{}", registry.document(&alias)?)))
        }
    }
}

fn new_topic(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["name"])?;
    let topic = engine.topics_mut().create(bound.optional("name"))?;
    Ok(Some(format!("Active topic: {}", topic.name)))
}

fn list_topics(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["limit"])?;
    let limit = bound.parse::<usize>("limit")?.unwrap_or(DEFAULT_LIST_LIMIT);

    let topics = engine.topics();
    let active = topics.current().name.as_str();
    let names = topics.list(limit);
    let lines: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let index = names.len() - i;
            let marker = if *name == active { " (active)" } else { "" };
            format!("{index}. {name}{marker}")
        })
        .collect();
    Ok(Some(lines.join("\n")))
}

fn switch_topic(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["name", "index"])?;
    let index = bound.parse::<usize>("index")?;
    let topic = engine.topics_mut().switch(bound.optional("name"), index)?;
    Ok(Some(format!("Active topic: {}", topic.name)))
}

fn rename_topic(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["new_name", "target"])?;
    let outcome = engine
        .topics_mut()
        .rename(bound.required("new_name")?, bound.optional("target"))?;
    Ok(Some(outcome.message()))
}

fn history(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["topic", "limit"])?;
    let limit = bound.parse::<usize>("limit")?.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let topic = bound.optional("topic");

    let topics = engine.topics();
    let name = topic.unwrap_or(topics.current().name.as_str());
    let log = topics.history(topic, limit)?;
    if log.is_empty() {
        return Ok(Some(format!("No messages in topic {name} yet")));
    }
    Ok(Some(log.iter().map(format_exchange).collect::<Vec<_>>().join("\n\n")))
}

fn format_exchange(exchange: &Exchange) -> String {
    format!(
        "[{}]\n{HUMAN_TOKEN}: {}\n{BOT_TOKEN}: {}",
        exchange.timestamp.format("%Y-%m-%d %H:%M"),
        exchange.prompt,
        exchange.response
    )
}

fn active_topic(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    args.bind(&[])?;
    Ok(Some(format!("Active topic: {}", engine.topics().current().name)))
}

fn list_models(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    args.bind(&[])?;
    let active = engine.query_config().model.as_str();
    let lines: Vec<String> = engine
        .models()
        .iter()
        .map(|m| {
            let marker = if m.id == active { " (active)" } else { "" };
            format!("{} - context window {}{marker}", m.id, m.context_window)
        })
        .collect();
    Ok(Some(lines.join("\n")))
}

fn switch_model(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["model"])?;
    let model = bound.required("model")?;
    engine.update_query(|q, catalog, reserve| q.set_model(model, catalog, reserve))?;
    Ok(Some(format!("Active model: {}", engine.query_config().model)))
}

fn active_model(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    args.bind(&[])?;
    Ok(Some(format!("Active model: {}", engine.query_config().model)))
}

fn set_max_tokens(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["max_tokens"])?;
    let n: u32 = bound.parse_required("max_tokens")?;
    engine.update_query(|q, catalog, reserve| q.set_max_tokens(n, catalog, reserve))?;
    Ok(Some(format!("Response max tokens length set to {n}")))
}

fn set_temperature(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["temperature"])?;
    let t: f64 = bound.parse_required("temperature")?;
    engine.update_query(|q, _, _| q.set_temperature(t))?;
    Ok(Some(format!("Temperature set to {t}")))
}

fn set_top_p(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["top_p"])?;
    let p: f64 = bound.parse_required("top_p")?;
    engine.update_query(|q, _, _| q.set_top_p(p))?;
    Ok(Some(format!("Top-p set to {p}")))
}

fn set_params(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    if !args.positional().is_empty() {
        return Err(ChatError::Validation(format!(
            "{} only takes key=value pairs",
            args.command()
        )));
    }
    if args.kwargs().is_empty() {
        return Err(ChatError::Validation(format!(
            "{} needs at least one key=value pair",
            args.command()
        )));
    }
    engine.update_query(|q, catalog, reserve| q.set_many(args.kwargs().iter(), catalog, reserve))?;
    Ok(None)
}

fn show_config(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    args.bind(&[])?;
    let lines: Vec<String> = engine
        .query_config()
        .entries()
        .into_iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect();
    Ok(Some(lines.join("\n")))
}

fn recent_errors(engine: &mut ConversationEngine, args: &CommandArgs) -> Result<Option<String>, ChatError> {
    let bound = args.bind(&["limit"])?;
    let limit = bound.parse::<usize>("limit")?.unwrap_or(DEFAULT_ERROR_LIMIT);
    let errors = engine.recent_errors(limit);
    if errors.is_empty() {
        return Ok(Some("No errors recorded".to_string()));
    }
    let lines: Vec<String> = errors
        .iter()
        .map(|e| {
            format!(
                "{} [{}] {:?}: {}",
                e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                e.kind,
                e.prompt,
                e.message
            )
        })
        .collect();
    Ok(Some(lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use palaver_core::{ModelCatalog, QueryConfig};
    use palaver_storage::MemoryBackend;

    use crate::completion::EchoCompletion;
    use crate::engine::EngineSettings;
    use crate::parser::QueryParser;
    use crate::topics::TopicStore;

    fn engine() -> ConversationEngine {
        let topics = TopicStore::load(Box::new(MemoryBackend::new()), "otter").unwrap();
        ConversationEngine::new(
            Arc::new(default_registry()),
            topics,
            QueryConfig::default(),
            ModelCatalog::default(),
            EngineSettings::default(),
            Box::new(EchoCompletion),
        )
    }

    fn args(raw: &str) -> CommandArgs {
        CommandArgs::from(QueryParser::new().parse(raw).unwrap())
    }

    // ---- Binding ----

    #[test]
    fn test_bind_positional_and_keyword() {
        let a = args("/rename_topic New target=Old");
        let bound = a.bind(&["new_name", "target"]).unwrap();
        assert_eq!(bound.required("new_name").unwrap(), "New");
        assert_eq!(bound.optional("target"), Some("Old"));
    }

    #[test]
    fn test_bind_keyword_only() {
        let a = args("/switch_topic index=2");
        let bound = a.bind(&["name", "index"]).unwrap();
        assert_eq!(bound.optional("name"), None);
        assert_eq!(bound.parse::<usize>("index").unwrap(), Some(2));
    }

    #[test]
    fn test_bind_too_many_positionals() {
        let a = args("/active_topic extra");
        let err = a.bind(&[]).unwrap_err();
        assert!(err.to_string().contains("at most 0"));
    }

    #[test]
    fn test_bind_unknown_keyword() {
        let a = args("/history colour=blue");
        let err = a.bind(&["topic", "limit"]).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert!(err.to_string().contains("'colour'"));
    }

    #[test]
    fn test_bind_duplicate_value() {
        let a = args("/new_topic first name=second");
        assert!(a.bind(&["name"]).unwrap_err().to_string().contains("multiple values"));
    }

    #[test]
    fn test_missing_required_argument() {
        let a = args("/model");
        let bound = a.bind(&["model"]).unwrap();
        let err = bound.required("model").unwrap_err();
        assert!(err.to_string().contains("'model'"));
    }

    #[test]
    fn test_bad_coercion_names_parameter_and_value() {
        let a = args("/set_max_tokens ten");
        let bound = a.bind(&["max_tokens"]).unwrap();
        let err = bound.parse_required::<u32>("max_tokens").unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert!(err.to_string().contains("'max_tokens'"));
        assert!(err.to_string().contains("'ten'"));
    }

    // ---- Handlers ----

    #[test]
    fn test_help_lists_commands() {
        let mut engine = engine();
        let reply = engine.handle("/help").unwrap();
        assert!(reply.starts_with("Available commands:\n/help: "));
        assert!(reply.contains("/new_topic: Start a new topic and make it active."));
        assert!(reply.find("/new_chat").unwrap() < reply.find("/model").unwrap());
    }

    #[test]
    fn test_help_for_one_command() {
        let mut engine = engine();
        let reply = engine.handle("/help set").unwrap();
        assert!(reply.starts_with("/set\nSet query parameters by name."));
        assert!(reply.contains("Either every update applies or none does."));
        assert!(engine.handle("/help nothing").is_err());
    }

    #[test]
    fn test_topic_commands() {
        let mut engine = engine();
        assert_eq!(engine.handle("/new_topic Rust").unwrap(), "Active topic: Rust");
        assert_eq!(engine.handle("/new_chat Music").unwrap(), "Active topic: Music");
        assert_eq!(
            engine.handle("/topics").unwrap(),
            "3. General\n2. Rust\n1. Music (active)"
        );
        assert_eq!(engine.handle("/switch_topic index=2").unwrap(), "Active topic: Rust");
        assert_eq!(engine.handle("/switch_chat gen").unwrap(), "Active topic: General");
        assert_eq!(engine.handle("/active_topic").unwrap(), "Active topic: General");
        assert_eq!(
            engine.handle("/rename_topic Misc").unwrap(),
            "Active topic renamed from General to Misc"
        );
        assert_eq!(
            engine.handle("/rename_chat Songs target=Music").unwrap(),
            "Topic Music renamed to Songs"
        );
        assert_eq!(engine.handle("/chats 1").unwrap(), "1. Songs");
    }

    #[test]
    fn test_new_topic_without_name_is_generated() {
        let mut engine = engine();
        let reply = engine.handle("/new_topic").unwrap();
        assert!(reply.starts_with("Active topic: "));
        assert!(reply.ends_with("-otter-0"));
    }

    #[test]
    fn test_history_command() {
        let mut engine = engine();
        assert_eq!(engine.handle("/history").unwrap(), "No messages in topic General yet");
        engine.handle("hello").unwrap();
        let reply = engine.handle("/history limit=1").unwrap();
        assert!(reply.contains("[HUMAN]: hello\n[BOT]: echo: hello"));
        assert!(engine.handle("/history topic=ghost").is_err());
    }

    #[test]
    fn test_model_commands() {
        let mut engine = engine();
        assert!(engine.handle("/list_models").unwrap().contains("text-davinci-003 - context window 4097 (active)"));
        assert_eq!(engine.handle("/model text-curie-001").unwrap(), "Active model: text-curie-001");
        assert_eq!(engine.handle("/active_model").unwrap(), "Active model: text-curie-001");

        let err = engine.handle("/switch_model gpt-9").unwrap_err();
        assert_eq!(err.to_string(), "model not found: gpt-9");
    }

    #[test]
    fn test_setter_commands() {
        let mut engine = engine();
        assert_eq!(
            engine.handle("/set_max_tokens 1000").unwrap(),
            "Response max tokens length set to 1000"
        );
        assert_eq!(engine.handle("/set_temperature 0.5").unwrap(), "Temperature set to 0.5");
        assert_eq!(engine.handle("/set_top_p 1").unwrap(), "Top-p set to 1");

        let err = engine.handle("/set_max_tokens 5000").unwrap_err();
        assert!(err.to_string().contains("[1, 3097]"));
        assert_eq!(engine.query_config().max_tokens, 1000);

        let err = engine.handle("/set_temperature hot").unwrap_err();
        assert!(err.to_string().contains("'hot'"));
    }

    #[test]
    fn test_set_command_all_or_nothing() {
        let mut engine = engine();
        assert_eq!(
            engine.handle("/set temperature=0.1 n=2").unwrap(),
            "Command /set finished successfully"
        );
        assert_eq!(engine.query_config().n, 2);

        let err = engine.handle("/set temperature=0.7 n=11").unwrap_err();
        assert!(err.to_string().contains("[1, 10]"));
        assert_eq!(engine.query_config().temperature, 0.1);

        let err = engine.handle("/set shiny=1").unwrap_err();
        assert_eq!(err.to_string(), "config key not found: shiny");
        assert!(engine.handle("/set").is_err());
        assert!(engine.handle("/set temperature").is_err());
    }

    #[test]
    fn test_config_command() {
        let mut engine = engine();
        let reply = engine.handle("/config").unwrap();
        assert!(reply.starts_with("model: text-davinci-003\nmax_tokens: 512"));
        assert!(reply.ends_with("user: none"));
    }

    #[test]
    fn test_errors_command() {
        let mut engine = engine();
        assert_eq!(engine.handle("/errors").unwrap(), "No errors recorded");
        let _ = engine.handle("/nope");
        let reply = engine.handle("/dev 1").unwrap();
        assert!(reply.contains("[not_found] \"/nope\": command not found: /nope"));
    }
}
