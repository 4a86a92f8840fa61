use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::env::WindowPort;

use super::protocol::Envelope;

/// Stable content hash of an outgoing payload.
pub fn fingerprint(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Sent,
    Unchanged,
    NotReady,
    NoTarget,
}

/// A child window (iframe or popup) this window pushes state into.
pub struct ChildLink {
    port: Box<dyn WindowPort>,
    loaded: bool,
    ready: bool,
    last_fingerprint: Option<String>,
}

impl ChildLink {
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

/// Child windows keyed by the frame name they render.
#[derive(Default)]
pub struct ChildLinks {
    links: BTreeMap<String, ChildLink>,
}

impl ChildLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, frame: &str, port: Box<dyn WindowPort>) {
        self.links.insert(
            frame.to_string(),
            ChildLink {
                port,
                loaded: false,
                ready: false,
                last_fingerprint: None,
            },
        );
    }

    pub fn detach(&mut self, frame: &str) -> bool {
        self.links.remove(frame).is_some()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.links.retain(|frame, _| keep(frame));
    }

    pub fn get(&self, frame: &str) -> Option<&ChildLink> {
        self.links.get(frame)
    }

    pub fn contains(&self, frame: &str) -> bool {
        self.links.contains_key(frame)
    }

    /// `iframeReady`: start pushing and forget what was sent before.
    pub fn mark_ready(&mut self, frame: &str) -> bool {
        let Some(link) = self.links.get_mut(frame) else {
            return false;
        };
        link.ready = true;
        link.last_fingerprint = None;
        true
    }

    /// DOM load event for the child's document.
    pub fn mark_loaded(&mut self, frame: &str) -> bool {
        let Some(link) = self.links.get_mut(frame) else {
            return false;
        };
        link.loaded = true;
        link.last_fingerprint = None;
        true
    }

    /// `frameNavStart`: hold pushes until the next ready/load.
    pub fn mark_navigating(&mut self, frame: &str) {
        if let Some(link) = self.links.get_mut(frame) {
            link.ready = false;
            link.loaded = false;
        }
    }

    pub fn reset_fingerprint(&mut self, frame: &str) {
        if let Some(link) = self.links.get_mut(frame) {
            link.last_fingerprint = None;
        }
    }

    pub fn ready_frames(&self) -> Vec<String> {
        self.links
            .iter()
            .filter(|(_, link)| link.ready)
            .map(|(frame, _)| frame.clone())
            .collect()
    }

    /// Post `envelope` to the child rendering `frame` unless the exact same
    /// payload was the last thing sent there.
    pub fn push(&mut self, frame: &str, envelope: &Envelope) -> PushOutcome {
        let Some(link) = self.links.get_mut(frame) else {
            warn!(frame, "no child window registered for frame; skipping sync");
            return PushOutcome::NoTarget;
        };
        if !link.ready {
            return PushOutcome::NotReady;
        }

        let payload = envelope.encode();
        let print = fingerprint(&payload);
        if link.last_fingerprint.as_deref() == Some(print.as_str()) {
            return PushOutcome::Unchanged;
        }

        link.port.post_message(&payload);
        link.last_fingerprint = Some(print);
        debug!(frame, kind = envelope.message.kind(), "pushed state to child window");
        PushOutcome::Sent
    }
}
