//! Slash-command shorthand parser.
//!
//! Turns `/command arg key=value ...` (optionally followed by a free-text
//! block on the next lines) into a [`ParsedQuery`]. Only the first line is
//! scanned for `key=value` pairs.

use crate::error::ChatError;

/// Keyword arguments in the order their keys first appeared.
///
/// A repeated key replaces the earlier value without moving it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Kwargs(Vec<(String, String)>);

impl Kwargs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Kwargs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut kwargs = Kwargs::new();
        for (k, v) in iter {
            kwargs.insert(k, v);
        }
        kwargs
    }
}

/// A parsed command invocation. All values are raw strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedQuery {
    /// The command token including its prefix, e.g. `/history`.
    pub command: String,
    pub args: Vec<String>,
    pub kwargs: Kwargs,
}

#[derive(Clone, Debug)]
pub struct QueryParser {
    prefix: char,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self { prefix: '/' }
    }
}

impl QueryParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `text` is meant as a command rather than a chat turn.
    pub fn is_command(&self, text: &str) -> bool {
        text.trim_start().starts_with(self.prefix)
    }

    pub fn parse(&self, raw: &str) -> Result<ParsedQuery, ChatError> {
        let text = raw.trim();
        let (line, trailing) = match text.split_once('\n') {
            Some((first, rest)) => {
                let rest = rest.trim();
                (first.trim(), (!rest.is_empty()).then_some(rest))
            }
            None => (text, None),
        };

        if !line.starts_with(self.prefix) {
            return Err(ChatError::Parse(format!(
                "missing command: expected input starting with '{}', got '{}'",
                self.prefix,
                truncate(line, 40)
            )));
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        let mut args = Vec::new();
        let mut kwargs = Kwargs::new();
        if !rest.is_empty() {
            if rest.contains('=') {
                scan_pairs(rest, &mut args, &mut kwargs)?;
            } else {
                args.push(rest.to_string());
            }
        }
        if let Some(trailing) = trailing {
            args.push(trailing.to_string());
        }

        Ok(ParsedQuery {
            command: command.to_string(),
            args,
            kwargs,
        })
    }
}

/// Walk the `=`-separated segments of the argument text.
///
/// Each segment before an `=` ends with the next key; whatever precedes the
/// key is a positional (first segment) or the previous key's value.
fn scan_pairs(rest: &str, args: &mut Vec<String>, kwargs: &mut Kwargs) -> Result<(), ChatError> {
    let segments: Vec<&str> = rest.split('=').collect();
    let last = segments.len() - 1;
    let mut pending_key: Option<String> = None;

    for (i, segment) in segments.iter().enumerate() {
        if i == last {
            if let Some(key) = pending_key.take() {
                kwargs.insert(key, segment.trim());
            }
            break;
        }

        // Leading whitespace still separates an empty value from the key.
        let segment = segment.trim_end();
        let (head, key) = match segment.rfind(char::is_whitespace) {
            Some(pos) => (segment[..pos].trim(), segment[pos..].trim()),
            None if i == 0 => ("", segment),
            None => {
                return Err(ChatError::Parse(format!(
                    "cannot split value and key in '{segment}' (segment {i} of '{rest}')"
                )));
            }
        };
        if key.is_empty() {
            return Err(ChatError::Parse(format!("'=' without a key in '{rest}'")));
        }

        match pending_key.take() {
            Some(prev) => kwargs.insert(prev, head),
            None if !head.is_empty() => args.push(head.to_string()),
            None => {}
        }
        pending_key = Some(key.to_string());
    }

    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
