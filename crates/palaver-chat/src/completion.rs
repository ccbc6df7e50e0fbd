//! Text-completion backends.

use palaver_core::QueryConfig;

use crate::error::ChatError;

/// Turn marker for user lines in assembled prompts.
pub const HUMAN_TOKEN: &str = "[HUMAN]";
/// Turn marker for model lines in assembled prompts.
pub const BOT_TOKEN: &str = "[BOT]";

/// A language-model backend: prompt plus parameters in, raw text out.
///
/// Implementations own their transport, timeouts and retries. Any failure
/// is reported as [`ChatError::Upstream`].
pub trait CompletionClient: Send + Sync {
    fn complete(&self, prompt: &str, config: &QueryConfig) -> Result<String, ChatError>;
}

/// Offline backend that echoes the last human line.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoCompletion;

impl CompletionClient for EchoCompletion {
    fn complete(&self, prompt: &str, _config: &QueryConfig) -> Result<String, ChatError> {
        let marker = format!("{HUMAN_TOKEN}:");
        let last = prompt
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix(&marker))
            .map(str::trim)
            .ok_or_else(|| ChatError::Upstream("prompt has no human turn to echo".to_string()))?;
        Ok(format!("{BOT_TOKEN}: echo: {last}"))
    }
}

impl<T: CompletionClient + ?Sized> CompletionClient for Box<T> {
    fn complete(&self, prompt: &str, config: &QueryConfig) -> Result<String, ChatError> {
        (**self).complete(prompt, config)
    }
}
