use crate::share::ShareId;
use std::path::PathBuf;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Mount,
    Unmount,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Mount => write!(f, "mount"),
            OperationKind::Unmount => write!(f, "unmount"),
        }
    }
}

/// Typed events the control loop publishes for GUI/notification
/// collaborators. Subscribers never block the loop.
#[derive(Debug, Clone)]
pub enum ShareEvent {
    AboutToStart {
        share: ShareId,
        kind: OperationKind,
    },
    Finished {
        share: ShareId,
        kind: OperationKind,
    },
    Mounted {
        share: ShareId,
        mount_point: PathBuf,
    },
    /// Fired before the record is purged from the active set, so
    /// subscribers can still read its last-known fields.
    Unmounted {
        share: ShareId,
        mount_point: PathBuf,
    },
    MountFailed {
        share: ShareId,
        reason: String,
    },
    UnmountFailed {
        share: ShareId,
        reason: String,
    },
    /// The remount policy gave up on a share after the retry ceiling.
    RemountExhausted {
        share: ShareId,
        attempts: u32,
    },
}

/// Broadcast fan-out for share events. Sending never blocks; slow or
/// absent subscribers just miss events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ShareEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShareEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ShareEvent) {
        // A send error only means there are no subscribers right now
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
