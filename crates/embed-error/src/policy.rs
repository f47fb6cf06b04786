//! A policy for classifying and emitting errors.
//!
//! Library code returns [`crate::Result`] and never logs on its own; the worker installs an
//! `ErrorPolicy` at its boundary and decides there how failures are presented.
//!
//! ```rust,ignore
//! use embed_error::{ErrorPolicy, Severity, WorkerError};
//!
//! struct PrintPolicy;
//! impl ErrorPolicy for PrintPolicy {
//!     fn classify(&self, e: &WorkerError) -> Severity { e.severity() }
//!     fn emit(&self, e: &WorkerError) { eprintln!("[{:?}] {e}", self.classify(e)); }
//! }
//! ```
use crate::{Severity, WorkerError};

pub trait ErrorPolicy: Send + Sync {
    /// Classify the error's severity
    fn classify(&self, error: &WorkerError) -> Severity;

    /// Emit the error according to the policy (e.g., log, forward to the host)
    fn emit(&self, error: &WorkerError);
}

/// Uses the error's own severity and emits via tracing, structured record attached.
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Default)]
pub struct TracingPolicy;

#[cfg(feature = "tracing")]
impl ErrorPolicy for TracingPolicy {
    fn classify(&self, error: &WorkerError) -> Severity {
        error.severity()
    }

    fn emit(&self, error: &WorkerError) {
        match self.classify(error) {
            Severity::Warning => error.emit_tracing(tracing::Level::WARN, "worker request refused"),
            Severity::Error => error.emit_tracing(tracing::Level::ERROR, "worker request failed"),
            Severity::Fatal => {
                error.emit_tracing(tracing::Level::ERROR, "worker context failed")
            }
        }
    }
}
