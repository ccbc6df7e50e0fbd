//! Error types for command dispatch and chat turns.

use std::fmt;

use palaver_core::error::PalaverError;

/// Errors from the conversation engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },
    #[error("invalid value: {0}")]
    Validation(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Machine-readable class of a [`ChatError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    NotFound,
    Validation,
    Upstream,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Parse(_) => ErrorKind::Parse,
            ChatError::NotFound { .. } => ErrorKind::NotFound,
            ChatError::Validation(_) => ErrorKind::Validation,
            ChatError::Upstream(_) => ErrorKind::Upstream,
            ChatError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        ChatError::NotFound {
            what,
            name: name.into(),
        }
    }
}

impl From<PalaverError> for ChatError {
    fn from(err: PalaverError) -> Self {
        match err {
            PalaverError::Validation(msg) => ChatError::Validation(msg),
            PalaverError::NotFound { what, name } => ChatError::NotFound { what, name },
            other => ChatError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        let err = ChatError::Parse("missing command".to_string());
        assert_eq!(err.to_string(), "parse error: missing command");

        let err = ChatError::not_found("command", "/nope");
        assert_eq!(err.to_string(), "command not found: /nope");

        let err = ChatError::Validation("temperature must be within [0, 1], got 2".to_string());
        assert_eq!(
            err.to_string(),
            "invalid value: temperature must be within [0, 1], got 2"
        );

        let err = ChatError::Upstream("quota exceeded".to_string());
        assert_eq!(err.to_string(), "upstream failure: quota exceeded");

        let err = ChatError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "storage error: disk full");
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(ChatError::Parse(String::new()).kind(), ErrorKind::Parse);
        assert_eq!(ChatError::not_found("topic", "x").kind(), ErrorKind::NotFound);
        assert_eq!(ChatError::Validation(String::new()).kind(), ErrorKind::Validation);
        assert_eq!(ChatError::Upstream(String::new()).kind(), ErrorKind::Upstream);
        assert_eq!(ChatError::Storage(String::new()).kind(), ErrorKind::Storage);
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
    }

    #[test]
    fn test_from_palaver_error() {
        let err: ChatError = PalaverError::Validation("n must be within [1, 10], got 0".to_string()).into();
        assert!(matches!(err, ChatError::Validation(_)));

        let err: ChatError = PalaverError::NotFound {
            what: "model",
            name: "gpt-9".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "model not found: gpt-9");

        let err: ChatError = PalaverError::Storage("connection lost".to_string()).into();
        match err {
            ChatError::Storage(msg) => assert!(msg.contains("connection lost")),
            other => panic!("Expected Storage, got {:?}", other),
        }

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ChatError = PalaverError::from(io).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
