use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Notify};

/// Lifecycle of a pollable buffer during a transport upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseStatus {
    /// The buffer accepts workers.
    Normal,
    /// A pause was requested, waiting for in-flight workers to finish.
    Pausing,
    /// The buffer is paused, no worker may start.
    Paused,
}

struct Shared {
    status: PauseStatus,
    workers: usize,
}

/// Coordinates polling flushes with a transport upgrade.
///
/// Each polling request takes a [`WorkerGuard`] with [`begin`](Pauser::begin)
/// before draining the buffer. During the upgrade handshake the websocket
/// task calls [`pause`](Pauser::pause) which blocks new workers, waits for
/// in-flight ones and then freezes the buffer. Exactly one concurrent
/// `pause` call wins.
pub struct Pauser {
    shared: Mutex<Shared>,
    /// Wakes the single winning pauser once the last worker leaves.
    idle: Notify,
    status_tx: watch::Sender<PauseStatus>,
    status_rx: watch::Receiver<PauseStatus>,
}

impl Pauser {
    pub fn new() -> Arc<Self> {
        let (status_tx, status_rx) = watch::channel(PauseStatus::Normal);
        Arc::new(Self {
            shared: Mutex::new(Shared {
                status: PauseStatus::Normal,
                workers: 0,
            }),
            idle: Notify::new(),
            status_tx,
            status_rx,
        })
    }

    /// Register a worker. Returns `None` if the buffer is already paused,
    /// in which case the caller must not touch the buffer.
    pub fn begin(self: &Arc<Self>) -> Option<WorkerGuard> {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        if shared.status == PauseStatus::Paused {
            return None;
        }
        shared.workers += 1;
        Some(WorkerGuard {
            pauser: self.clone(),
        })
    }

    /// Pause the buffer. Blocks new workers immediately, then waits for
    /// in-flight workers to finish before freezing the buffer.
    ///
    /// Returns `true` for exactly one caller, which owns the transition to
    /// [`PauseStatus::Paused`]. Losing callers wait for the winner and
    /// return `false`.
    pub async fn pause(&self) -> bool {
        let winner = {
            let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            match shared.status {
                PauseStatus::Normal => {
                    shared.status = PauseStatus::Pausing;
                    self.status_tx.send_replace(PauseStatus::Pausing);
                    if shared.workers == 0 {
                        shared.status = PauseStatus::Paused;
                        self.status_tx.send_replace(PauseStatus::Paused);
                        return true;
                    }
                    true
                }
                PauseStatus::Pausing => false,
                PauseStatus::Paused => return false,
            }
        };

        if winner {
            loop {
                self.idle.notified().await;
                let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
                if shared.workers == 0 {
                    shared.status = PauseStatus::Paused;
                    self.status_tx.send_replace(PauseStatus::Paused);
                    return true;
                }
            }
        } else {
            let mut rx = self.status_rx.clone();
            // already Paused or will become Paused, never goes back to
            // Normal without an explicit resume
            while *rx.borrow_and_update() != PauseStatus::Paused {
                if rx.changed().await.is_err() {
                    break;
                }
            }
            false
        }
    }

    /// Reopen a paused or pausing buffer, e.g. after a failed upgrade.
    pub fn resume(&self) {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        shared.status = PauseStatus::Normal;
        self.status_tx.send_replace(PauseStatus::Normal);
    }

    /// Resolves once a pause has been requested. Used by flushing workers to
    /// abandon their long-poll wait.
    pub async fn pausing(&self) {
        let mut rx = self.status_rx.clone();
        while *rx.borrow_and_update() == PauseStatus::Normal {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn status(&self) -> PauseStatus {
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).status
    }

    fn end(&self) {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        shared.workers -= 1;
        if shared.workers == 0 && shared.status == PauseStatus::Pausing {
            self.idle.notify_one();
        }
    }
}

impl std::fmt::Debug for Pauser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("Pauser")
            .field("status", &shared.status)
            .field("workers", &shared.workers)
            .finish()
    }
}

/// Keeps the buffer unpausable while a worker drains it.
/// Dropped when the flush completes.
pub struct WorkerGuard {
    pauser: Arc<Pauser>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.pauser.end();
    }
}
