use tokio::sync::watch;

use crate::model::{ElementMap, FrameElement};

/// Read-only snapshot handed to the rendering layer after every mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameView {
    pub revision: u64,
    pub frames: Vec<String>,
    pub elements: ElementMap,
    pub current_frame: String,
}

impl FrameView {
    pub fn elements_of(&self, frame: &str) -> &[FrameElement] {
        self.elements.get(frame).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Child window that has not received its first `syncFrame` yet.
    AwaitingParent,
    /// Child window holding state pushed by its parent.
    Synced,
    /// Top window with edits waiting for the debounced save.
    SavePending,
    /// Top window whose URL and session snapshot match memory.
    Saved,
}

/// Observable sync indicator shared with whoever renders it.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<SyncStatus>,
}

impl StatusBoard {
    pub fn new(initial: SyncStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, status: SyncStatus) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    pub fn get(&self) -> SyncStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }
}
