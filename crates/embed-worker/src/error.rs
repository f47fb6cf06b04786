use embed_error::{ErrorDetail, WorkerError};

/// Failure to reach the worker loop or to hear back from it.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    #[error("Failed to send request to embed worker")]
    SendError,
    #[error("Failed to receive response from embed worker")]
    RecvError,
}

impl From<RecvError> for WorkerError {
    #[track_caller]
    fn from(e: RecvError) -> Self {
        WorkerError::with_cause(
            ErrorDetail::Uncaught {
                message: "embed worker channel closed".into(),
            },
            e,
        )
    }
}
