//! Error taxonomy for the embedding worker.
//!
//! Every failure the worker can report is a [`WorkerError`]: a typed [`ErrorDetail`] (one variant
//! per [`ErrorKind`], each with its own context payload), an optional originating cause, and the
//! source location where the error was raised. Native error values do not survive the boundary to
//! the host, so [`WorkerError::to_record`] flattens all of that into a plain [`ErrorRecord`].
pub mod kind;
pub mod policy;
pub mod record;
pub mod result_ext;
pub mod severity;

pub use kind::ErrorKind;
pub use policy::ErrorPolicy;
#[cfg(feature = "tracing")]
pub use policy::TracingPolicy;
pub use record::{ErrorOrigin, ErrorRecord};
pub use result_ext::{ResultExt, WrapCause};
pub use severity::Severity;

use std::panic::Location;
use std::sync::Arc;

use embed_core::LifecycleState;
use serde_json::json;

pub type Result<T, E = WorkerError> = std::result::Result<T, E>;

/// Shared handle to the error that triggered a [`WorkerError`].
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// What went wrong, with the context needed to diagnose it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ErrorDetail {
    #[error("Inference runtime not loaded properly: {reason}")]
    Initialization { reason: String },

    #[error("Failed to create inference session")]
    Session {
        model_location: String,
        execution_providers: Vec<String>,
        optimization_level: String,
    },

    #[error("Failed to fetch tokenizer from {location} (status {status})")]
    TokenizerFetch { location: String, status: u16 },

    #[error("Invalid tokenizer format: no vocabulary at {pointer}")]
    TokenizerFormat {
        pointer: String,
        received: serde_json::Value,
    },

    #[error("Tokenizer initialization failed")]
    Tokenizer { location: String },

    #[error("Initialization timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Embedding calculation failed: {reason}")]
    Embedding { reason: String },

    #[error("Input produced no valid tokens to pool")]
    NoValidTokens { max_length: usize },

    #[error("Worker not initialized. Call init first. (state: {state})")]
    NotInitialized { state: LifecycleState },

    #[error("Initialization already attempted (state: {state})")]
    InitRejected { state: LifecycleState },

    #[error("{message}")]
    Uncaught { message: String },
}

impl ErrorDetail {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorDetail::Initialization { .. } => ErrorKind::Initialization,
            ErrorDetail::Session { .. } => ErrorKind::Session,
            ErrorDetail::TokenizerFetch { .. } => ErrorKind::TokenizerFetch,
            ErrorDetail::TokenizerFormat { .. } => ErrorKind::TokenizerFormat,
            ErrorDetail::Tokenizer { .. } => ErrorKind::Tokenizer,
            ErrorDetail::Timeout { .. } => ErrorKind::Timeout,
            ErrorDetail::Embedding { .. } => ErrorKind::Embedding,
            ErrorDetail::NoValidTokens { .. } => ErrorKind::NoValidTokens,
            ErrorDetail::NotInitialized { .. } | ErrorDetail::InitRejected { .. } => {
                ErrorKind::State
            }
            ErrorDetail::Uncaught { .. } => ErrorKind::Uncaught,
        }
    }

    /// Free-form diagnostic context for the serialized record.
    pub fn details(&self) -> serde_json::Value {
        match self {
            ErrorDetail::Initialization { reason } => json!({ "reason": reason }),
            ErrorDetail::Session {
                model_location,
                execution_providers,
                optimization_level,
            } => json!({
                "model_location": model_location,
                "session_options": {
                    "execution_providers": execution_providers,
                    "optimization_level": optimization_level,
                },
            }),
            ErrorDetail::TokenizerFetch { location, status } => {
                json!({ "location": location, "status": status })
            }
            ErrorDetail::TokenizerFormat { pointer, received } => {
                json!({ "pointer": pointer, "received_data": received })
            }
            ErrorDetail::Tokenizer { location } => json!({ "location": location }),
            ErrorDetail::Timeout { timeout_ms } => json!({ "timeout_ms": timeout_ms }),
            ErrorDetail::Embedding { reason } => json!({ "reason": reason }),
            ErrorDetail::NoValidTokens { max_length } => json!({ "max_length": max_length }),
            ErrorDetail::NotInitialized { state } | ErrorDetail::InitRejected { state } => {
                json!({ "state": state })
            }
            ErrorDetail::Uncaught { .. } => json!({}),
        }
    }
}

/// A failure raised anywhere in the worker.
#[derive(Debug, Clone)]
pub struct WorkerError {
    detail: ErrorDetail,
    cause: Option<Cause>,
    origin: &'static Location<'static>,
}

impl WorkerError {
    #[track_caller]
    pub fn new(detail: ErrorDetail) -> Self {
        Self {
            detail,
            cause: None,
            origin: Location::caller(),
        }
    }

    #[track_caller]
    pub fn with_cause<E>(detail: ErrorDetail, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            detail,
            cause: Some(Arc::new(cause)),
            origin: Location::caller(),
        }
    }

    #[track_caller]
    pub fn with_boxed_cause(
        detail: ErrorDetail,
        cause: Box<dyn std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        Self {
            detail,
            cause: Some(Arc::from(cause)),
            origin: Location::caller(),
        }
    }

    /// Catch-all for failures that have no dedicated kind.
    #[track_caller]
    pub fn uncaught(message: impl Into<String>) -> Self {
        Self::new(ErrorDetail::Uncaught {
            message: message.into(),
        })
    }

    #[track_caller]
    pub fn embedding(reason: impl Into<String>) -> Self {
        Self::new(ErrorDetail::Embedding {
            reason: reason.into(),
        })
    }

    #[track_caller]
    pub fn not_initialized(state: LifecycleState) -> Self {
        Self::new(ErrorDetail::NotInitialized { state })
    }

    pub fn kind(&self) -> ErrorKind {
        self.detail.kind()
    }

    pub fn detail(&self) -> &ErrorDetail {
        &self.detail
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    pub fn origin(&self) -> &'static Location<'static> {
        self.origin
    }

    pub fn message(&self) -> String {
        self.detail.to_string()
    }

    pub fn severity(&self) -> Severity {
        match self.kind() {
            ErrorKind::State => Severity::Warning,
            k if k.is_initialization_phase() => Severity::Fatal,
            _ => Severity::Error,
        }
    }

}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.detail, cause),
            None => write!(f, "{}", self.detail),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorDetail> for WorkerError {
    #[track_caller]
    fn from(detail: ErrorDetail) -> Self {
        WorkerError::new(detail)
    }
}
