//! Plain, serializable view of a [`WorkerError`] for crossing the host boundary.
//!
//! The record holds only owned strings and JSON values, so it round-trips through serde and
//! means the same thing on both sides. Field order is fixed and `details` objects are key-sorted,
//! which keeps the serialized form deterministic.

use serde::{Deserialize, Serialize};

use crate::{ErrorKind, WorkerError};

pub const ERROR_NAME: &str = "WorkerError";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorOrigin {
    pub filename: String,
    pub lineno: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub name: String,
    pub message: String,
    pub kind: ErrorKind,
    pub cause: Option<String>,
    pub details: serde_json::Value,
    pub origin: ErrorOrigin,
}

impl WorkerError {
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord {
            name: ERROR_NAME.to_string(),
            message: self.message(),
            kind: self.kind(),
            cause: self.cause().map(|c| c.to_string()),
            details: self.detail().details(),
            origin: ErrorOrigin {
                filename: self.origin().file().to_string(),
                lineno: self.origin().line(),
            },
        }
    }

    /// Emit a tracing event carrying both the Display string and the structured record.
    #[cfg(feature = "tracing")]
    pub fn emit_tracing(&self, level: tracing::Level, message: &str) {
        let record = self.to_record();
        let details = record.details.to_string();
        let kind = record.kind.as_str();
        match level {
            tracing::Level::ERROR => {
                tracing::error!(error = %self, kind, details = %details, "{message}")
            }
            tracing::Level::WARN => {
                tracing::warn!(error = %self, kind, details = %details, "{message}")
            }
            tracing::Level::INFO => {
                tracing::info!(error = %self, kind, details = %details, "{message}")
            }
            tracing::Level::DEBUG => {
                tracing::debug!(error = %self, kind, details = %details, "{message}")
            }
            tracing::Level::TRACE => {
                tracing::trace!(error = %self, kind, details = %details, "{message}")
            }
        }
    }
}
