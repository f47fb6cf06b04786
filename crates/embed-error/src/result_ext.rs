use crate::{ErrorDetail, ErrorPolicy, Result, WorkerError};

/// Extension trait for `Result` enabling policy-driven emission without
/// contaminating core control-flow with side-effects.
///
/// ```rust,ignore
/// use embed_error::{Result, ResultExt, ErrorPolicy};
///
/// fn serve(policy: &(impl ErrorPolicy + ?Sized)) -> Result<Vec<f32>> {
///     compute().emit_event(policy) // still Err for the caller to report
/// }
/// ```
pub trait ResultExt<T> {
    /// Emit the error using the provided policy and return the result unchanged
    fn emit_event(self, policy: &(impl ErrorPolicy + ?Sized)) -> Self;
}

impl<T> ResultExt<T> for Result<T> {
    fn emit_event(self, policy: &(impl ErrorPolicy + ?Sized)) -> Self {
        if let Err(ref e) = self {
            policy.emit(e);
        }
        self
    }
}

/// Reclassify a foreign error into the taxonomy at the point where it occurs.
///
/// The detail is built lazily and the origin recorded is the caller's, not this module's.
pub trait WrapCause<T> {
    fn wrap_cause(self, detail: impl FnOnce() -> ErrorDetail) -> Result<T>;
}

impl<T, E> WrapCause<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn wrap_cause(self, detail: impl FnOnce() -> ErrorDetail) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(WorkerError::with_cause(detail(), e)),
        }
    }
}
