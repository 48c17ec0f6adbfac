//! The single, process-wide engine status record.
//!
//! Only the connection supervisor and the process manager mutate it; every
//! other component reads snapshots or subscribes to changes. The watch
//! channel guarantees readers never observe a torn update.

use serde::Serialize;
use tokio::sync::watch;

/// Snapshot of the bridge's view of the engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub connected: bool,
    pub ready: bool,
    pub error: Option<String>,
    pub connection_attempts: u32,
}

/// Owner of the live [`EngineStatus`]; republishes the full snapshot on
/// every change.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<EngineStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(EngineStatus::default());
        Self { tx }
    }

    /// Applies a mutation and publishes the result. `ready` implies
    /// `connected`; the board enforces the invariant on every write.
    pub fn update(&self, f: impl FnOnce(&mut EngineStatus)) {
        self.tx.send_modify(|status| {
            f(status);
            if !status.connected {
                status.ready = false;
            }
        });
    }

    pub fn snapshot(&self) -> EngineStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.tx.subscribe()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
