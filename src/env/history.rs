use tokio::sync::mpsc;
use url::Url;

use super::BrowserHistory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryChangeKind {
    PushState,
    ReplaceState,
    PopState,
    HashChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryChange {
    pub kind: HistoryChangeKind,
    pub url: Url,
}

/// Wraps a window's history so every state change is reported.
///
/// `push_state`/`replace_state` are forwarded to the inner history and then
/// queued; `popstate` and `hashchange` are reported by the embedder through
/// [`TrackedHistory::pop_state`] and [`TrackedHistory::hash_change`].
pub struct TrackedHistory<H> {
    inner: H,
    changes: mpsc::UnboundedSender<HistoryChange>,
}

impl<H: BrowserHistory> TrackedHistory<H> {
    pub fn new(inner: H) -> (Self, mpsc::UnboundedReceiver<HistoryChange>) {
        let (changes, rx) = mpsc::unbounded_channel();
        (Self { inner, changes }, rx)
    }

    pub fn pop_state(&self) {
        self.emit(HistoryChangeKind::PopState);
    }

    pub fn hash_change(&self) {
        self.emit(HistoryChangeKind::HashChange);
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    fn emit(&self, kind: HistoryChangeKind) {
        let url = self.inner.current_url();
        // receiver gone means the window is tearing down
        let _ = self.changes.send(HistoryChange { kind, url });
    }
}

impl<H: BrowserHistory> BrowserHistory for TrackedHistory<H> {
    fn current_url(&self) -> Url {
        self.inner.current_url()
    }

    fn push_state(&mut self, url: &Url) {
        self.inner.push_state(url);
        self.emit(HistoryChangeKind::PushState);
    }

    fn replace_state(&mut self, url: &Url) {
        self.inner.replace_state(url);
        self.emit(HistoryChangeKind::ReplaceState);
    }
}
