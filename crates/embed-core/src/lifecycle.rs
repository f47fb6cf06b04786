use serde::{Deserialize, Serialize};

/// Lifecycle of a single execution context.
///
/// `Uninitialized -> Initializing -> Ready | Failed`. `Ready` and `Failed` are terminal; a host
/// that wants to retry after a failure constructs a new context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl LifecycleState {
    pub fn is_ready(self) -> bool {
        matches!(self, LifecycleState::Ready)
    }

    /// Whether `self -> next` is one of the allowed transitions.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Uninitialized, Initializing) | (Initializing, Ready) | (Initializing, Failed)
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::Failed => "failed",
        };
        f.write_str(s)
    }
}
