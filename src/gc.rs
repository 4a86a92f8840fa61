//! Removal of frame subtrees from memory and from every persisted page.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::codec::{parse_elements, parse_frames, serialize_elements, serialize_frames};
use crate::model::{ElementMap, FrameElement};
use crate::params::{elements_key, frames_key, PageParams};

pub type ContainmentGraph = BTreeMap<String, BTreeSet<String>>;

/// Parent frame -> child frames, unioned across memory and every persisted page.
pub fn containment_graph(in_memory: &ElementMap, persisted: &PageParams) -> ContainmentGraph {
    let mut graph = ContainmentGraph::new();
    let mut add_edges = |elements: &ElementMap| {
        for (parent, list) in elements {
            for child in list.iter().filter_map(FrameElement::child_frame) {
                graph
                    .entry(parent.clone())
                    .or_default()
                    .insert(child.to_string());
            }
        }
    };

    add_edges(in_memory);
    for (_, raw) in persisted.element_entries() {
        add_edges(&parse_elements(raw));
    }

    graph
}

/// `frame` and every frame reachable from it.
pub fn descendants(frame: &str, graph: &ContainmentGraph) -> BTreeSet<String> {
    let mut visited = BTreeSet::new();
    let mut stack = vec![frame.to_string()];

    while let Some(name) = stack.pop() {
        if !visited.insert(name.clone()) {
            continue;
        }
        if let Some(children) = graph.get(&name) {
            stack.extend(children.iter().filter(|c| !visited.contains(*c)).cloned());
        }
    }

    visited
}

/// Drop removed frames and any container element naming them. Returns the
/// surviving frames whose lists changed.
pub fn scrub_element_map(elements: &mut ElementMap, removed: &BTreeSet<String>) -> BTreeSet<String> {
    elements.retain(|frame, _| !removed.contains(frame));

    let mut touched = BTreeSet::new();
    for (frame, list) in elements.iter_mut() {
        let before = list.len();
        list.retain(|element| {
            element
                .child_frame()
                .map_or(true, |child| !removed.contains(child))
        });
        if list.len() != before {
            touched.insert(frame.clone());
        }
    }
    touched
}

/// Scrub every page's `frames.*`/`elements.*` entries. Pages left holding
/// only an empty root frame are dropped. Returns how many pages changed.
pub fn scrub_persisted(params: &mut PageParams, removed: &BTreeSet<String>, root_frame: &str) -> usize {
    let mut changed_pages = 0;

    for page in params.pages() {
        let frames_raw = params.get(&frames_key(&page)).unwrap_or("").to_string();
        let elements_raw = params.get(&elements_key(&page)).unwrap_or("").to_string();

        let frames = parse_frames(&frames_raw);
        let kept_frames: Vec<String> = frames
            .iter()
            .filter(|name| !removed.contains(*name))
            .cloned()
            .collect();

        let mut elements = parse_elements(&elements_raw);
        let frame_count = elements.len();
        let touched = scrub_element_map(&mut elements, removed);

        if kept_frames.len() == frames.len() && touched.is_empty() && elements.len() == frame_count {
            continue;
        }
        changed_pages += 1;

        let only_empty_root = kept_frames.iter().all(|name| name == root_frame)
            && elements.values().all(Vec::is_empty)
            && elements.keys().all(|name| name == root_frame);
        if only_empty_root {
            debug!(page = %page, "dropping page left empty by frame removal");
            params.remove_page(&page);
            continue;
        }

        params.set(frames_key(&page), serialize_frames(&kept_frames));
        params.set(elements_key(&page), serialize_elements(&elements));
    }

    changed_pages
}
