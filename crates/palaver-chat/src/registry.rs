//! Alias table for slash commands.
//!
//! Maps every alias to a handler plus the text used for `/help`. The same
//! table drives dispatch and the rendered command list.

use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::debug;

use crate::error::ChatError;

/// Placeholder shown for commands registered without documentation.
pub const NO_DESCRIPTION: &str = "No description available.";

/// Display group of a command. Listings are ordered by this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandGroup {
    Basic,
    Topics,
    Model,
    Dev,
}

impl CommandGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandGroup::Basic => "basic",
            CommandGroup::Topics => "topics",
            CommandGroup::Model => "model",
            CommandGroup::Dev => "dev",
        }
    }
}

#[derive(Clone, Debug)]
struct CommandEntry<H> {
    handler: H,
    description: String,
    doc: String,
    group: CommandGroup,
    active: bool,
}

/// Registered commands, keyed by alias.
///
/// Built once at startup and then shared read-only; `list_commands` caches
/// its result until the next `register`.
#[derive(Debug)]
pub struct CommandRegistry<H> {
    entries: HashMap<String, CommandEntry<H>>,
    /// Aliases in first-registration order.
    order: Vec<String>,
    listing: OnceLock<Vec<String>>,
}

impl<H> Default for CommandRegistry<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            listing: OnceLock::new(),
        }
    }
}

impl<H: Clone> CommandRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `aliases` to one handler.
    ///
    /// The short description is the first non-empty line of `doc`. An alias
    /// that was already registered is remapped but keeps its list position.
    pub fn register(&mut self, aliases: &[&str], group: CommandGroup, active: bool, doc: &str, handler: H) {
        let doc = normalize_doc(doc);
        let description = doc
            .lines()
            .find(|line| !line.is_empty())
            .unwrap_or(NO_DESCRIPTION)
            .to_string();

        for alias in aliases {
            let entry = CommandEntry {
                handler: handler.clone(),
                description: description.clone(),
                doc: doc.clone(),
                group,
                active,
            };
            if self.entries.insert(alias.to_string(), entry).is_none() {
                self.order.push(alias.to_string());
            }
        }
        self.listing.take();
        debug!(?aliases, group = group.as_str(), active, "Command registered");
    }

    /// All aliases, grouped by [`CommandGroup`], registration order within a group.
    pub fn list_commands(&self) -> &[String] {
        self.listing.get_or_init(|| {
            let mut aliases = self.order.clone();
            aliases.sort_by_key(|alias| self.entries.get(alias).map(|e| e.group));
            aliases
        })
    }

    pub fn resolve(&self, alias: &str) -> Result<H, ChatError> {
        self.entry(alias).map(|e| e.handler.clone())
    }

    pub fn describe(&self, alias: &str) -> Result<&str, ChatError> {
        self.entry(alias).map(|e| e.description.as_str())
    }

    /// Full documentation, or the placeholder if none was given.
    pub fn document(&self, alias: &str) -> Result<&str, ChatError> {
        self.entry(alias).map(|e| {
            if e.doc.is_empty() {
                NO_DESCRIPTION
            } else {
                e.doc.as_str()
            }
        })
    }

    pub fn group_of(&self, alias: &str) -> Result<CommandGroup, ChatError> {
        self.entry(alias).map(|e| e.group)
    }

    pub fn is_active(&self, alias: &str) -> Result<bool, ChatError> {
        self.entry(alias).map(|e| e.active)
    }

    /// `(alias, description)` for every active alias, in listing order.
    pub fn active_commands(&self) -> Vec<(&str, &str)> {
        self.list_commands()
            .iter()
            .filter_map(|alias| {
                let entry = self.entries.get(alias)?;
                entry
                    .active
                    .then_some((alias.as_str(), entry.description.as_str()))
            })
            .collect()
    }

    /// One `alias: description` line per active alias.
    pub fn help_text(&self) -> String {
        self.active_commands()
            .into_iter()
            .map(|(alias, description)| format!("{alias}: {description}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, alias: &str) -> Result<&CommandEntry<H>, ChatError> {
        self.entries
            .get(alias)
            .ok_or_else(|| ChatError::not_found("command", alias))
    }
}

/// Strip per-line indentation and surrounding blank lines.
fn normalize_doc(doc: &str) -> String {
    doc.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CommandRegistry<u32> {
        let mut registry = CommandRegistry::new();
        registry.register(&["/model"], CommandGroup::Model, true, "Switch model.", 3);
        registry.register(&["/help"], CommandGroup::Basic, true, "Show help.\nMore detail.", 1);
        registry.register(
            &["/new_chat", "/new_topic"],
            CommandGroup::Topics,
            true,
            "\n    Start a new topic.\n    Name is optional.\n",
            2,
        );
        registry.register(&["/dev"], CommandGroup::Dev, false, "", 4);
        registry
    }

    // ---- Listing ----

    #[test]
    fn test_listing_sorted_by_group_then_insertion() {
        let registry = registry();
        assert_eq!(
            registry.list_commands(),
            ["/help", "/new_chat", "/new_topic", "/model", "/dev"]
        );
    }

    #[test]
    fn test_registration_after_listing_invalidates_cache() {
        let mut registry = registry();
        assert_eq!(registry.list_commands().len(), 5);

        registry.register(&["/about"], CommandGroup::Basic, true, "About.", 5);
        let listing = registry.list_commands();
        assert_eq!(listing.len(), 6);
        assert_eq!(listing[1], "/about");
    }

    #[test]
    fn test_reregistered_alias_last_wins_and_keeps_position() {
        let mut registry = registry();
        registry.register(&["/help"], CommandGroup::Basic, true, "New help.", 9);

        assert_eq!(registry.resolve("/help").unwrap(), 9);
        assert_eq!(registry.describe("/help").unwrap(), "New help.");
        assert_eq!(registry.list_commands()[0], "/help");
        assert_eq!(registry.len(), 5);
    }

    // ---- Accessors ----

    #[test]
    fn test_aliases_share_handler_and_docs() {
        let registry = registry();
        assert_eq!(registry.resolve("/new_chat").unwrap(), 2);
        assert_eq!(registry.resolve("/new_topic").unwrap(), 2);
        assert_eq!(registry.describe("/new_topic").unwrap(), "Start a new topic.");
        assert_eq!(
            registry.document("/new_chat").unwrap(),
            "Start a new topic.\nName is optional."
        );
        assert_eq!(registry.group_of("/new_chat").unwrap(), CommandGroup::Topics);
    }

    #[test]
    fn test_missing_doc_uses_placeholder() {
        let registry = registry();
        assert_eq!(registry.describe("/dev").unwrap(), NO_DESCRIPTION);
        assert_eq!(registry.document("/dev").unwrap(), NO_DESCRIPTION);
        assert!(!registry.is_active("/dev").unwrap());
    }

    #[test]
    fn test_unknown_alias_not_found_everywhere() {
        let registry = registry();
        let is_not_found = |e: ChatError| matches!(e, ChatError::NotFound { what: "command", .. });
        assert!(is_not_found(registry.resolve("/nope").unwrap_err()));
        assert!(is_not_found(registry.describe("/nope").unwrap_err()));
        assert!(is_not_found(registry.document("/nope").unwrap_err()));
        assert!(is_not_found(registry.group_of("/nope").unwrap_err()));
        assert!(is_not_found(registry.is_active("/nope").unwrap_err()));
    }

    // ---- Help ----

    #[test]
    fn test_help_text_skips_inactive() {
        let registry = registry();
        let help = registry.help_text();
        let lines: Vec<&str> = help.lines().collect();
        assert_eq!(lines[0], "/help: Show help.");
        assert_eq!(lines.len(), 4);
        assert!(!help.contains("/dev"));
    }

    #[test]
    fn test_active_commands_pairs() {
        let registry = registry();
        let active = registry.active_commands();
        assert_eq!(active[3], ("/model", "Switch model."));
    }

    #[test]
    fn test_group_order() {
        assert!(CommandGroup::Basic < CommandGroup::Topics);
        assert!(CommandGroup::Topics < CommandGroup::Model);
        assert!(CommandGroup::Model < CommandGroup::Dev);
    }
}
