use serde::{Deserialize, Serialize};

/// Symbolic kind carried by every [`crate::WorkerError`] and by its serialized record.
///
/// The serialized names are part of the boundary contract with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "initialization_error")]
    Initialization,
    #[serde(rename = "session_error")]
    Session,
    #[serde(rename = "tokenizer_fetch_error")]
    TokenizerFetch,
    #[serde(rename = "tokenizer_format_error")]
    TokenizerFormat,
    #[serde(rename = "tokenizer_error")]
    Tokenizer,
    #[serde(rename = "timeout_error")]
    Timeout,
    #[serde(rename = "embedding_error")]
    Embedding,
    #[serde(rename = "no_valid_tokens_error")]
    NoValidTokens,
    #[serde(rename = "state_error")]
    State,
    #[serde(rename = "uncaught_error")]
    Uncaught,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Initialization => "initialization_error",
            ErrorKind::Session => "session_error",
            ErrorKind::TokenizerFetch => "tokenizer_fetch_error",
            ErrorKind::TokenizerFormat => "tokenizer_format_error",
            ErrorKind::Tokenizer => "tokenizer_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::Embedding => "embedding_error",
            ErrorKind::NoValidTokens => "no_valid_tokens_error",
            ErrorKind::State => "state_error",
            ErrorKind::Uncaught => "uncaught_error",
        }
    }

    /// Kinds raised while bringing a context up. These are terminal for the context.
    pub fn is_initialization_phase(self) -> bool {
        matches!(
            self,
            ErrorKind::Initialization
                | ErrorKind::Session
                | ErrorKind::TokenizerFetch
                | ErrorKind::TokenizerFormat
                | ErrorKind::Tokenizer
                | ErrorKind::Timeout
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
