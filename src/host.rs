//! Per-window context object tying the store, persistence and messaging
//! together.
//!
//! A [`FrameHost`] is created when a window starts and dropped when it goes
//! away. The rendering layer calls its mutators, hands it every inbound
//! `postMessage` payload, and reads state back through [`FrameView`]s. The
//! top window owns persistence; child windows mirror what their parent
//! pushes and relay edits upward.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::env::{BrowserHistory, HistoryChange, Mailbox, SessionStorage, WindowPort};
use crate::messaging::{ChildLinks, Envelope, FrameMessage, PushOutcome};
use crate::model::{collect_subtree, CustomProps, FrameElement};
use crate::params::{page_name, PageParams};
use crate::persistence::{CommitReport, PersistenceEngine, SaveDebouncer};
use crate::state::{ContainerHandle, FrameStore, FrameView, StatusBoard, SyncStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRole {
    Top,
    Child,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{operation} is only available in a {expected:?} window")]
    WrongRole {
        operation: &'static str,
        expected: WindowRole,
    },
    #[error("{0} called before the window was booted")]
    NotBooted(&'static str),
    #[error("child window has neither an opener nor a parent")]
    NoUpstream,
    #[error("no unused id left for {0}")]
    IdsExhausted(String),
}

/// Where a window sits among browsing contexts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowPlacement {
    /// `window.top === window`
    pub is_top_level: bool,
    /// `window.parent !== window`
    pub has_parent: bool,
    /// `Boolean(window.opener)`
    pub has_opener: bool,
}

impl WindowPlacement {
    pub fn top() -> Self {
        Self {
            is_top_level: true,
            has_parent: false,
            has_opener: false,
        }
    }

    pub fn iframe() -> Self {
        Self {
            is_top_level: false,
            has_parent: true,
            has_opener: false,
        }
    }

    pub fn popup() -> Self {
        Self {
            is_top_level: true,
            has_parent: false,
            has_opener: true,
        }
    }

    pub fn role(&self) -> WindowRole {
        if self.has_parent || self.has_opener {
            WindowRole::Child
        } else {
            WindowRole::Top
        }
    }
}

pub struct FrameHost {
    config: SyncConfig,
    placement: WindowPlacement,
    frame_name: String,
    store: FrameStore,
    persistence: Option<PersistenceEngine>,
    debouncer: SaveDebouncer,
    links: ChildLinks,
    upstream: Option<Box<dyn WindowPort>>,
    status: StatusBoard,
    booted: bool,
}

impl FrameHost {
    /// Host for the top window, which owns the URL and session snapshot.
    pub fn top(
        config: SyncConfig,
        storage: Box<dyn SessionStorage>,
        history: Box<dyn BrowserHistory>,
    ) -> Self {
        let persistence = PersistenceEngine::new(storage, history, &config);
        let store = FrameStore::new(&config, persistence.current_page());
        Self {
            frame_name: config.root_frame.clone(),
            debouncer: SaveDebouncer::new(config.save_debounce()),
            placement: WindowPlacement::top(),
            store,
            persistence: Some(persistence),
            links: ChildLinks::new(),
            upstream: None,
            status: StatusBoard::new(SyncStatus::Saved),
            booted: false,
            config,
        }
    }

    /// Host for an iframe or popup rendering `frame_name`. Messages go to the
    /// opener when there is one, otherwise to the parent.
    pub fn child(
        config: SyncConfig,
        placement: WindowPlacement,
        frame_name: impl Into<String>,
        opener: Option<Box<dyn WindowPort>>,
        parent: Option<Box<dyn WindowPort>>,
    ) -> Result<Self, HostError> {
        if placement.role() != WindowRole::Child {
            return Err(HostError::WrongRole {
                operation: "FrameHost::child",
                expected: WindowRole::Child,
            });
        }
        let upstream = opener.or(parent).ok_or(HostError::NoUpstream)?;
        let store = FrameStore::new(&config, config.default_page.clone());
        Ok(Self {
            frame_name: frame_name.into(),
            debouncer: SaveDebouncer::new(config.save_debounce()),
            placement,
            store,
            persistence: None,
            links: ChildLinks::new(),
            upstream: Some(upstream),
            status: StatusBoard::new(SyncStatus::AwaitingParent),
            booted: false,
            config,
        })
    }

    /// Top: restore state from URL/session. Child: announce readiness.
    pub fn boot(&mut self) {
        if self.booted {
            return;
        }
        match self.persistence.as_mut() {
            Some(persistence) => {
                let loaded = persistence.load();
                info!(page = %loaded.page, frames = loaded.frames.len(), "top window booted");
                self.store.hydrate(loaded);
                self.status.set(SyncStatus::Saved);
            }
            None => {
                info!(frame = %self.frame_name, "child window booted; waiting for parent");
                self.send_upstream(FrameMessage::IframeReady {
                    frame_name: self.frame_name.clone(),
                });
                self.status.set(SyncStatus::AwaitingParent);
            }
        }
        self.booted = true;
    }

    pub fn role(&self) -> WindowRole {
        self.placement.role()
    }

    pub fn placement(&self) -> WindowPlacement {
        self.placement
    }

    pub fn frame_name(&self) -> &str {
        &self.frame_name
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    pub fn view(&self) -> FrameView {
        self.store.view()
    }

    pub fn subscribe(&self) -> watch::Receiver<FrameView> {
        self.store.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.get()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn elements_of(&self, frame: &str) -> &[FrameElement] {
        self.store.elements_of(frame)
    }

    /// Child windows render nothing meaningful before the first push.
    pub fn is_synced(&self) -> bool {
        self.status.get() != SyncStatus::AwaitingParent
    }

    pub fn next_save_deadline(&self) -> Option<tokio::time::Instant> {
        self.debouncer.deadline()
    }

    /// The persisted snapshot (session merged with URL).
    pub fn persisted(&self) -> Result<PageParams, HostError> {
        Ok(self.persistence("persisted")?.snapshot())
    }

    // ---- rendering layer mutators -------------------------------------

    pub fn register_frame(&mut self, name: &str) -> Result<(), HostError> {
        self.ensure_booted("register_frame")?;
        let known = self.store.has_frame(name);
        self.store.register_frame(name);
        match self.role() {
            WindowRole::Top => {
                if !known {
                    self.schedule_save();
                }
            }
            WindowRole::Child => self.send_upstream(FrameMessage::FrameAdded {
                frame_name: name.to_string(),
            }),
        }
        Ok(())
    }

    pub fn attach_container(&mut self, frame: &str, handle: ContainerHandle) {
        self.store.attach_container(frame, handle);
    }

    pub fn container_of(&self, frame: &str) -> Option<ContainerHandle> {
        self.store.container(frame).and_then(|slot| slot.handle)
    }

    pub fn select_frame(&mut self, frame: &str) {
        self.store.select_frame(frame);
    }

    /// Top windows mint the id and return it. Child windows relay the request
    /// and return `None`; the element arrives with the next `syncFrame`.
    pub fn add_element(
        &mut self,
        frame: &str,
        component_name: &str,
        is_frame_or_container: bool,
        custom_props: CustomProps,
    ) -> Result<Option<String>, HostError> {
        self.ensure_booted("add_element")?;
        match self.role() {
            WindowRole::Top => {
                let id = self.add_authoritative(frame, component_name, is_frame_or_container, custom_props)?;
                Ok(Some(id))
            }
            WindowRole::Child => {
                self.send_upstream(FrameMessage::AddElement {
                    frame_name: frame.to_string(),
                    component_name: component_name.to_string(),
                    is_frame_or_container,
                    custom_props,
                });
                Ok(None)
            }
        }
    }

    /// Remove an element; container elements take their frame subtree with
    /// them.
    pub fn remove_element(&mut self, frame: &str, element_id: &str) -> Result<(), HostError> {
        self.ensure_booted("remove_element")?;
        self.apply_remove(frame, element_id);
        if self.role() == WindowRole::Child {
            self.send_upstream(FrameMessage::RemoveElement {
                element_id: element_id.to_string(),
                frame_name: frame.to_string(),
            });
        }
        Ok(())
    }

    pub fn move_element(&mut self, frame: &str, element_id: &str, x: f64, y: f64) -> Result<(), HostError> {
        self.ensure_booted("move_element")?;
        self.apply_move(frame, element_id, x, y);
        if self.role() == WindowRole::Child {
            self.send_upstream(FrameMessage::UpdateElementPosition {
                element_id: element_id.to_string(),
                frame_name: frame.to_string(),
                x_percent: x,
                y_percent: y,
            });
        }
        Ok(())
    }

    // ---- child window bookkeeping (parent side) -----------------------

    /// A child window for `frame` was mounted (iframe created or popup
    /// opened); `port` reaches it.
    pub fn child_attached(&mut self, frame: &str, port: Box<dyn WindowPort>) {
        self.links.attach(frame, port);
    }

    /// The child's document fired `load`.
    pub fn child_loaded(&mut self, frame: &str) {
        if self.links.mark_loaded(frame) {
            self.push_sync(frame);
        }
    }

    pub fn child_detached(&mut self, frame: &str) {
        self.links.detach(frame);
    }

    /// Push every ready child its current subtree; unchanged payloads are
    /// skipped.
    pub fn sync_children(&mut self) {
        for frame in self.links.ready_frames() {
            self.push_sync(&frame);
        }
    }

    // ---- child window lifecycle ----------------------------------------

    /// Called before this child window unloads or navigates away.
    pub fn begin_navigation(&mut self) -> Result<(), HostError> {
        self.ensure_child("begin_navigation")?;
        self.send_upstream(FrameMessage::FrameNavStart {
            frame_name: self.frame_name.clone(),
        });
        Ok(())
    }

    /// This child window's URL changed without a reload.
    pub fn history_changed(&mut self, url: &Url) -> Result<(), HostError> {
        self.ensure_child("history_changed")?;
        let page_name = page_name(url, &self.config.default_page);
        debug!(frame = %self.frame_name, page = %page_name, "child page changed");
        self.send_upstream(FrameMessage::FramePageChanged {
            frame_name: self.frame_name.clone(),
            page_name,
        });
        Ok(())
    }

    /// Report every queued history change from a [`crate::env::TrackedHistory`].
    pub fn drain_history(
        &mut self,
        changes: &mut mpsc::UnboundedReceiver<HistoryChange>,
    ) -> Result<usize, HostError> {
        let mut count = 0;
        while let Ok(change) = changes.try_recv() {
            self.history_changed(&change.url)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn request_sync(&mut self) -> Result<(), HostError> {
        self.ensure_child("request_sync")?;
        self.send_upstream(FrameMessage::RequestSync {
            frame_name: self.frame_name.clone(),
        });
        Ok(())
    }

    // ---- top window persistence ----------------------------------------

    /// Commit if the debounce deadline has passed.
    pub fn flush_due(&mut self) -> Option<CommitReport> {
        if self.debouncer.take_due() {
            self.commit().ok()
        } else {
            None
        }
    }

    /// Commit immediately, cancelling any pending debounce.
    pub fn flush_now(&mut self) -> Result<CommitReport, HostError> {
        self.debouncer.dispose();
        self.commit()
    }

    /// Wait for the pending save, if any, and commit it.
    pub async fn settle(&mut self) -> Option<CommitReport> {
        self.debouncer.deadline()?;
        self.debouncer.wait().await;
        self.flush_due()
    }

    pub fn note_navigation(&mut self, url: &Url) -> Result<(), HostError> {
        self.persistence_mut("note_navigation")?.note_navigation(url);
        Ok(())
    }

    pub fn origin_pages(&self, index: u32) -> Result<Vec<String>, HostError> {
        Ok(self.persistence("origin_pages")?.origin_pages(index))
    }

    pub fn origins(&self) -> Result<BTreeMap<u32, Vec<String>>, HostError> {
        Ok(self.persistence("origins")?.all_origins())
    }

    pub fn add_origin_page(&mut self, index: u32, page: &str) -> Result<Vec<String>, HostError> {
        Ok(self.persistence_mut("add_origin_page")?.add_origin_page(index, page))
    }

    /// Cancel the pending save; used on unmount.
    pub fn dispose(&mut self) {
        self.debouncer.dispose();
    }

    // ---- inbound messages ----------------------------------------------

    /// Handle one raw `postMessage` payload. Undecodable payloads are logged
    /// and dropped.
    pub fn handle_message(&mut self, payload: &Value) {
        match Envelope::decode(payload) {
            Ok(envelope) => self.dispatch(envelope),
            Err(err) => debug!(error = %err, "ignoring message"),
        }
    }

    /// Handle everything currently queued in `mailbox`.
    pub fn pump(&mut self, mailbox: &mut Mailbox) -> usize {
        let mut handled = 0;
        while let Ok(payload) = mailbox.try_recv() {
            self.handle_message(&payload);
            handled += 1;
        }
        handled
    }

    /// Process messages and debounced saves until `mailbox` closes, then
    /// flush whatever is still pending.
    pub async fn run(&mut self, mailbox: &mut Mailbox) {
        loop {
            tokio::select! {
                payload = mailbox.recv() => match payload {
                    Some(payload) => self.handle_message(&payload),
                    None => break,
                },
                _ = self.debouncer.wait() => {
                    self.flush_due();
                }
            }
        }
        if self.debouncer.deadline().is_some() {
            if let Err(err) = self.flush_now() {
                warn!(error = %err, "final save failed");
            }
        }
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let kind = envelope.message.kind();
        if self.role() == WindowRole::Child && envelope.message.is_relayed_upstream() {
            self.apply_locally(&envelope.message);
            self.forward(&envelope);
            return;
        }

        match envelope.message {
            FrameMessage::IframeReady { frame_name } => {
                if !self.links.mark_ready(&frame_name) {
                    warn!(frame = %frame_name, "iframeReady from unknown child window");
                    return;
                }
                self.push_sync(&frame_name);
            }
            FrameMessage::FrameNavStart { frame_name } => {
                self.links.mark_navigating(&frame_name);
            }
            FrameMessage::RequestSync { frame_name } => {
                self.links.reset_fingerprint(&frame_name);
                self.push_sync(&frame_name);
            }
            FrameMessage::SyncFrame { frame_name, elements } => {
                if self.role() == WindowRole::Top {
                    debug!(frame = %frame_name, "top window ignores syncFrame");
                    return;
                }
                self.store.apply_sync(elements);
                self.status.set(SyncStatus::Synced);
                self.sync_children();
            }
            FrameMessage::FrameAdded { frame_name } => {
                if !self.store.has_frame(&frame_name) {
                    self.store.register_frame(&frame_name);
                    self.schedule_save();
                }
            }
            FrameMessage::AddElement {
                frame_name,
                component_name,
                is_frame_or_container,
                custom_props,
            } => {
                if let Err(err) =
                    self.add_authoritative(&frame_name, &component_name, is_frame_or_container, custom_props)
                {
                    warn!(error = %err, "failed to add relayed element");
                }
            }
            FrameMessage::RemoveElement {
                element_id,
                frame_name,
            } => self.apply_remove(&frame_name, &element_id),
            FrameMessage::UpdateElementPosition {
                element_id,
                frame_name,
                x_percent,
                y_percent,
            } => {
                self.apply_move(&frame_name, &element_id, x_percent, y_percent);
            }
            FrameMessage::FramePageChanged {
                frame_name,
                page_name,
            } => self.switch_frame_page(&frame_name, &page_name),
        }
        debug!(kind, "handled message");
    }

    /// Mirror a relayed edit in this intermediate window before passing it on.
    fn apply_locally(&mut self, message: &FrameMessage) {
        match message {
            FrameMessage::RemoveElement {
                element_id,
                frame_name,
            } => self.apply_remove(frame_name, element_id),
            FrameMessage::UpdateElementPosition {
                element_id,
                frame_name,
                x_percent,
                y_percent,
            } => self.apply_move(frame_name, element_id, *x_percent, *y_percent),
            FrameMessage::FrameAdded { frame_name } => self.store.register_frame(frame_name),
            _ => {}
        }
    }

    fn forward(&self, envelope: &Envelope) {
        if envelope.relay_hops >= self.config.max_relay_hops {
            warn!(
                kind = envelope.message.kind(),
                hops = envelope.relay_hops,
                "dropping message that exceeded the relay hop limit"
            );
            return;
        }
        if let Some(upstream) = &self.upstream {
            upstream.post_message(&envelope.relayed().encode());
        }
    }

    fn add_authoritative(
        &mut self,
        frame: &str,
        component_name: &str,
        is_frame_or_container: bool,
        custom_props: CustomProps,
    ) -> Result<String, HostError> {
        let persisted = self.persistence("add_element")?.snapshot();
        let id = self
            .store
            .add_element_to_frame(frame, component_name, is_frame_or_container, custom_props, &persisted)
            .ok_or_else(|| HostError::IdsExhausted(component_name.to_string()))?;
        debug!(frame, id = %id, "added element");
        self.after_change();
        Ok(id)
    }

    fn apply_remove(&mut self, frame: &str, element_id: &str) {
        let Some(removed) = self.store.remove_element_from_frame(frame, element_id) else {
            debug!(frame, element_id, "remove for missing element ignored");
            return;
        };

        if removed.is_frame_or_container {
            let persisted = match self.persistence.as_ref() {
                Some(persistence) => persistence.snapshot(),
                None => PageParams::new(),
            };
            let gone = self.store.unregister_frame(&removed, &persisted);
            self.forget_frames(&gone);
        }
        self.after_change();
    }

    fn apply_move(&mut self, frame: &str, element_id: &str, x: f64, y: f64) {
        if self.store.update_element_position(frame, element_id, x, y) {
            self.after_change();
        }
    }

    fn forget_frames(&mut self, gone: &BTreeSet<String>) {
        if let Some(persistence) = self.persistence.as_mut() {
            let pages = persistence.scrub(gone);
            debug!(frames = gone.len(), pages, "scrubbed removed frames from persisted pages");
        }
        self.links.retain(|frame| !gone.contains(frame));
    }

    /// Swap in the persisted lists of `page` for `frame` and its nested
    /// frames, then push them to whichever child window renders them.
    fn switch_frame_page(&mut self, frame: &str, page: &str) {
        if self.persistence.is_none() {
            return;
        }
        // unsaved edits belong to the page the frame is leaving
        let dirty = self.store.dirty_frames();
        let leaving_dirty = collect_subtree(self.store.elements(), frame)
            .keys()
            .any(|name| dirty.contains(name));
        if leaving_dirty {
            if let Err(err) = self.flush_now() {
                warn!(error = %err, frame, "failed to save before page switch");
            }
        }

        let Some(persistence) = self.persistence.as_ref() else {
            return;
        };
        let subtree = collect_subtree(&persistence.page_elements(page), frame);
        for name in subtree.keys() {
            self.store.register_frame(name);
            self.store.set_frame_page(name, page);
        }
        self.store.apply_sync(subtree);
        info!(frame, page, "frame moved to another page");
        self.sync_children();
    }

    fn after_change(&mut self) {
        if self.role() == WindowRole::Top {
            self.schedule_save();
        }
        self.sync_children();
    }

    fn schedule_save(&mut self) {
        if self.persistence.is_none() {
            return;
        }
        self.debouncer.schedule();
        self.status.set(SyncStatus::SavePending);
    }

    fn commit(&mut self) -> Result<CommitReport, HostError> {
        let persistence = self.persistence.as_mut().ok_or(HostError::WrongRole {
            operation: "commit",
            expected: WindowRole::Top,
        })?;
        let report = persistence.commit(&mut self.store);
        self.status.set(SyncStatus::Saved);
        Ok(report)
    }

    fn push_sync(&mut self, frame: &str) -> PushOutcome {
        let envelope = Envelope::new(FrameMessage::SyncFrame {
            frame_name: frame.to_string(),
            elements: collect_subtree(self.store.elements(), frame),
        });
        self.links.push(frame, &envelope)
    }

    fn send_upstream(&self, message: FrameMessage) {
        match &self.upstream {
            Some(upstream) => upstream.post_message(&Envelope::new(message).encode()),
            None => warn!(kind = message.kind(), "no upstream window; message dropped"),
        }
    }

    fn ensure_booted(&self, operation: &'static str) -> Result<(), HostError> {
        if self.booted {
            Ok(())
        } else {
            Err(HostError::NotBooted(operation))
        }
    }

    fn ensure_child(&self, operation: &'static str) -> Result<(), HostError> {
        if self.role() == WindowRole::Child {
            Ok(())
        } else {
            Err(HostError::WrongRole {
                operation,
                expected: WindowRole::Child,
            })
        }
    }

    fn persistence(&self, operation: &'static str) -> Result<&PersistenceEngine, HostError> {
        self.persistence.as_ref().ok_or(HostError::WrongRole {
            operation,
            expected: WindowRole::Top,
        })
    }

    fn persistence_mut(&mut self, operation: &'static str) -> Result<&mut PersistenceEngine, HostError> {
        self.persistence.as_mut().ok_or(HostError::WrongRole {
            operation,
            expected: WindowRole::Top,
        })
    }
}
