use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the frame that always exists and can never be removed.
pub const ROOT_FRAME: &str = "TopFrame";

/// Opaque key/value bag carried by an element and never interpreted here.
pub type CustomProps = Map<String, Value>;

/// Frame name -> ordered element list (order is paint/mount order).
pub type ElementMap = BTreeMap<String, Vec<FrameElement>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameElement {
    pub id: String,
    pub component_name: String,
    pub x_percent: f64,
    pub y_percent: f64,
    pub is_frame_or_container: bool,
    #[serde(default)]
    pub custom_props: CustomProps,
}

impl FrameElement {
    pub fn new(
        id: impl Into<String>,
        component_name: impl Into<String>,
        is_frame_or_container: bool,
    ) -> Self {
        Self {
            id: id.into(),
            component_name: component_name.into(),
            x_percent: 50.0,
            y_percent: 50.0,
            is_frame_or_container,
            custom_props: CustomProps::new(),
        }
    }

    pub fn at(mut self, x_percent: f64, y_percent: f64) -> Self {
        self.x_percent = x_percent;
        self.y_percent = y_percent;
        self
    }

    pub fn with_props(mut self, props: CustomProps) -> Self {
        self.custom_props = props;
        self
    }

    /// The child frame this element names, if it is a container.
    pub fn child_frame(&self) -> Option<&str> {
        self.is_frame_or_container.then_some(self.id.as_str())
    }
}

/// Frame names directly nested in `frame` according to `elements`.
pub fn child_frames<'a>(elements: &'a ElementMap, frame: &str) -> impl Iterator<Item = &'a str> {
    elements
        .get(frame)
        .into_iter()
        .flatten()
        .filter_map(FrameElement::child_frame)
}

/// Collect `frame` plus every frame nested transitively inside it.
///
/// The result always contains `frame` itself (with an empty list when it has
/// no recorded elements). Revisits are skipped so a malformed cyclic map
/// still terminates.
pub fn collect_subtree(elements: &ElementMap, frame: &str) -> ElementMap {
    let mut out = ElementMap::new();
    let mut visited = BTreeSet::new();
    let mut stack = vec![frame.to_string()];

    while let Some(name) = stack.pop() {
        if !visited.insert(name.clone()) {
            continue;
        }
        let list = elements.get(&name).cloned().unwrap_or_default();
        for child in list.iter().filter_map(FrameElement::child_frame) {
            if !visited.contains(child) {
                stack.push(child.to_string());
            }
        }
        out.insert(name, list);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str) -> FrameElement {
        FrameElement::new(id, "Container", true)
    }

    #[test]
    fn subtree_includes_nested_frames_only() {
        let mut elements = ElementMap::new();
        elements.insert(
            ROOT_FRAME.into(),
            vec![container("Container-1"), FrameElement::new("Panel-1", "Panel", false)],
        );
        elements.insert("Container-1".into(), vec![container("Container-2")]);
        elements.insert("Container-2".into(), vec![]);
        elements.insert("Container-9".into(), vec![]);

        let subtree = collect_subtree(&elements, "Container-1");
        let names: Vec<_> = subtree.keys().cloned().collect();
        assert_eq!(names, vec!["Container-1", "Container-2"]);
    }

    #[test]
    fn subtree_tolerates_cycles_and_missing_frames() {
        let mut elements = ElementMap::new();
        elements.insert("A".into(), vec![container("B")]);
        elements.insert("B".into(), vec![container("A"), container("C")]);

        let subtree = collect_subtree(&elements, "A");
        assert_eq!(subtree.len(), 3);
        assert_eq!(subtree.get("C"), Some(&Vec::new()));
    }

    #[test]
    fn element_serializes_with_camel_case_fields() {
        let element = FrameElement::new("Panel-1", "Panel", false).at(10.0, 20.0);
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["componentName"], "Panel");
        assert_eq!(json["isFrameOrContainer"], false);
        assert_eq!(json["xPercent"], 10.0);
    }
}
