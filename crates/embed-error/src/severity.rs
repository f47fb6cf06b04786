//! Coarse-grained classification for programmatic handling of errors.
//!
//! - Warning: the request was refused but the context is healthy (e.g. infer before init)
//! - Error: a single request failed; later requests are unaffected
//! - Fatal: the context can no longer serve requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

