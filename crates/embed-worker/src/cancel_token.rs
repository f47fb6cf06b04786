//! Cooperative cancellation for work that is abandoned rather than killed.
//!
//! When the init timer wins its race, the loader task keeps running; the controller flips the
//! flag and the loader checks it at each checkpoint, discarding whatever it built instead of
//! handing it back.
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("work abandoned after cancellation")]
pub struct Abandoned;

/// Handle to trigger cancellation
#[derive(Debug)]
pub struct CancellationHandle {
    sender: watch::Sender<bool>,
}

/// A clonable handle that can check for cancellation
#[derive(Debug, Clone)]
pub struct CancellationListener {
    receiver: watch::Receiver<bool>,
}

/// Create a connected handle/listener pair, not yet cancelled.
pub fn cancellation_pair() -> (CancellationHandle, CancellationListener) {
    let (sender, receiver) = watch::channel(false);
    (
        CancellationHandle { sender },
        CancellationListener { receiver },
    )
}

impl CancellationHandle {
    /// Signal cancellation to all associated listeners
    pub fn cancel(&self) {
        // send_replace never fails, even with no listeners left
        self.sender.send_replace(true);
    }
}

impl CancellationListener {
    /// `Err(Abandoned)` once cancellation was requested; call before publishing any result.
    pub fn checkpoint(&self) -> Result<(), Abandoned> {
        if *self.receiver.borrow() {
            Err(Abandoned)
        } else {
            Ok(())
        }
    }
}
