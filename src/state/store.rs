use std::collections::{BTreeSet, HashMap};

use tokio::sync::watch;
use tracing::debug;

use crate::config::SyncConfig;
use crate::gc;
use crate::ids::IdAllocator;
use crate::model::{CustomProps, ElementMap, FrameElement};
use crate::params::PageParams;

use super::view::FrameView;

/// Opaque renderer handle for the DOM node a frame mounts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerHandle(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerSlot {
    pub handle: Option<ContainerHandle>,
}

/// State restored from the URL/session snapshot on boot.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedState {
    pub page: String,
    pub frames: Vec<String>,
    pub elements: ElementMap,
}

/// Authoritative frame/element state for one window.
///
/// Every mutation marks the affected frames dirty and publishes a fresh
/// [`FrameView`].
pub struct FrameStore {
    root: String,
    default_position: [f64; 2],
    frames: Vec<String>,
    elements: ElementMap,
    frame_pages: HashMap<String, String>,
    containers: HashMap<String, ContainerSlot>,
    dirty: BTreeSet<String>,
    current_frame: String,
    current_page: String,
    ids: IdAllocator,
    revision: u64,
    view: watch::Sender<FrameView>,
}

impl FrameStore {
    pub fn new(config: &SyncConfig, current_page: impl Into<String>) -> Self {
        let root = config.root_frame.clone();
        let current_page = current_page.into();

        let mut elements = ElementMap::new();
        elements.insert(root.clone(), Vec::new());
        let mut frame_pages = HashMap::new();
        frame_pages.insert(root.clone(), current_page.clone());
        let mut containers = HashMap::new();
        containers.insert(root.clone(), ContainerSlot::default());

        let (view, _) = watch::channel(FrameView::default());
        let mut store = Self {
            root: root.clone(),
            default_position: config.default_position,
            frames: vec![root.clone()],
            elements,
            frame_pages,
            containers,
            dirty: BTreeSet::new(),
            current_frame: root,
            current_page,
            ids: IdAllocator::new(),
            revision: 0,
            view,
        };
        store.publish();
        store
    }

    /// Replace everything with state restored on boot. Nothing is dirty
    /// afterwards; restored ids are fed to the allocator.
    pub fn hydrate(&mut self, loaded: LoadedState) {
        self.current_page = loaded.page;
        self.frames.clear();
        self.elements = loaded.elements;
        self.frame_pages.clear();
        self.dirty.clear();

        for frame in std::iter::once(self.root.clone()).chain(loaded.frames) {
            if !self.frames.contains(&frame) {
                self.frames.push(frame);
            }
        }
        self.elements.entry(self.root.clone()).or_default();

        for frame in &self.frames {
            self.frame_pages
                .insert(frame.clone(), self.current_page.clone());
            self.containers.entry(frame.clone()).or_default();
        }
        for list in self.elements.values() {
            self.ids.record(list);
        }

        self.current_frame = self.root.clone();
        self.publish();
    }

    pub fn register_frame(&mut self, name: &str) {
        if !self.frames.iter().any(|f| f == name) {
            self.frames.push(name.to_string());
        }
        self.containers.entry(name.to_string()).or_default();
        self.elements.entry(name.to_string()).or_default();

        if !self.frame_pages.contains_key(name) {
            let page = self
                .parent_of(name)
                .and_then(|parent| self.frame_pages.get(parent))
                .cloned()
                .unwrap_or_else(|| self.current_page.clone());
            debug!(frame = name, page = %page, "registered frame");
            self.frame_pages.insert(name.to_string(), page);
        }

        self.publish();
    }

    /// Frame whose element list holds an element with id `frame`.
    pub fn parent_of(&self, frame: &str) -> Option<&str> {
        self.elements
            .iter()
            .find(|(_, list)| list.iter().any(|element| element.id == frame))
            .map(|(parent, _)| parent.as_str())
    }

    pub fn attach_container(&mut self, frame: &str, handle: ContainerHandle) {
        self.containers.entry(frame.to_string()).or_default().handle = Some(handle);
    }

    pub fn container(&self, frame: &str) -> Option<ContainerSlot> {
        self.containers.get(frame).copied()
    }

    /// Allocate an id that is unique across memory and every persisted page,
    /// then append the element at the default position. `None` when no
    /// unused id is left for `component_name`.
    pub fn add_element_to_frame(
        &mut self,
        target_frame: &str,
        component_name: &str,
        is_frame_or_container: bool,
        custom_props: CustomProps,
        persisted: &PageParams,
    ) -> Option<String> {
        let id = self.ids.next_id(component_name, &self.elements, persisted)?;
        let [x, y] = self.default_position;
        let element = FrameElement::new(id.clone(), component_name, is_frame_or_container)
            .at(x, y)
            .with_props(custom_props);

        self.elements
            .entry(target_frame.to_string())
            .or_default()
            .push(element);
        self.mark_dirty(target_frame);
        self.publish();
        Some(id)
    }

    /// Filter one element out of a frame. Child frames are left alone; the
    /// caller cascades through [`FrameStore::unregister_frame`].
    pub fn remove_element_from_frame(&mut self, frame: &str, element_id: &str) -> Option<FrameElement> {
        let list = self.elements.get_mut(frame)?;
        let index = list.iter().position(|element| element.id == element_id)?;
        let removed = list.remove(index);
        self.mark_dirty(frame);
        self.publish();
        Some(removed)
    }

    /// Move an element. Unknown frames or elements are ignored.
    pub fn update_element_position(&mut self, frame: &str, element_id: &str, x: f64, y: f64) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        let Some(element) = self
            .elements
            .get_mut(frame)
            .and_then(|list| list.iter_mut().find(|element| element.id == element_id))
        else {
            debug!(frame, element_id, "position update for missing element ignored");
            return false;
        };

        element.x_percent = x.clamp(0.0, 100.0);
        element.y_percent = y.clamp(0.0, 100.0);
        self.mark_dirty(frame);
        self.publish();
        true
    }

    /// Remove the frame named by `element` and all of its descendants,
    /// including descendants only known from other persisted pages. Returns
    /// the removed frame names; persisted pages are scrubbed by the caller.
    pub fn unregister_frame(&mut self, element: &FrameElement, persisted: &PageParams) -> BTreeSet<String> {
        let Some(frame) = element.child_frame() else {
            return BTreeSet::new();
        };

        let graph = gc::containment_graph(&self.elements, persisted);
        let mut removed = gc::descendants(frame, &graph);
        removed.remove(&self.root);

        self.frames.retain(|name| !removed.contains(name));
        self.containers.retain(|name, _| !removed.contains(name));
        self.frame_pages.retain(|name, _| !removed.contains(name));
        self.dirty.retain(|name| !removed.contains(name));

        for touched in gc::scrub_element_map(&mut self.elements, &removed) {
            self.mark_dirty(&touched);
        }

        debug!(frame, removed = removed.len(), "unregistered frame subtree");
        self.current_frame = self.root.clone();
        self.publish();
        removed
    }

    /// Replace the element lists of every frame in `incoming`, as pushed by a
    /// parent window. Nothing is marked dirty.
    pub fn apply_sync(&mut self, incoming: ElementMap) {
        for (frame, list) in incoming {
            if !self.frames.contains(&frame) {
                self.frames.push(frame.clone());
            }
            self.containers.entry(frame.clone()).or_default();
            self.ids.record(&list);
            self.elements.insert(frame, list);
        }
        self.publish();
    }

    /// Re-home `frame` under `page` without marking them dirty.
    pub fn set_frame_page(&mut self, frame: &str, page: &str) {
        self.frame_pages.insert(frame.to_string(), page.to_string());
    }

    pub fn select_frame(&mut self, frame: &str) {
        if self.frames.iter().any(|f| f == frame) {
            self.current_frame = frame.to_string();
            self.publish();
        }
    }

    pub fn mark_dirty(&mut self, frame: &str) {
        self.dirty.insert(frame.to_string());
    }

    pub fn dirty_frames(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    pub fn has_frame(&self, frame: &str) -> bool {
        self.frames.iter().any(|f| f == frame)
    }

    pub fn elements(&self) -> &ElementMap {
        &self.elements
    }

    pub fn elements_of(&self, frame: &str) -> &[FrameElement] {
        self.elements.get(frame).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find_element(&self, frame: &str, element_id: &str) -> Option<&FrameElement> {
        self.elements_of(frame).iter().find(|e| e.id == element_id)
    }

    pub fn page_of(&self, frame: &str) -> Option<&str> {
        self.frame_pages.get(frame).map(String::as_str)
    }

    /// Known frames owned by `page`, in registration order.
    pub fn frames_on_page(&self, page: &str) -> Vec<String> {
        self.frames
            .iter()
            .filter(|frame| self.page_of(frame) == Some(page))
            .cloned()
            .collect()
    }

    /// Every page owning at least one known frame.
    pub fn pages(&self) -> BTreeSet<String> {
        self.frames
            .iter()
            .filter_map(|frame| self.frame_pages.get(frame).cloned())
            .collect()
    }

    pub fn current_page(&self) -> &str {
        &self.current_page
    }

    pub fn current_frame(&self) -> &str {
        &self.current_frame
    }

    pub fn subscribe(&self) -> watch::Receiver<FrameView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> FrameView {
        self.view.borrow().clone()
    }

    fn publish(&mut self) {
        self.revision += 1;
        self.view.send_replace(FrameView {
            revision: self.revision,
            frames: self.frames.clone(),
            elements: self.elements.clone(),
            current_frame: self.current_frame.clone(),
        });
    }
}
