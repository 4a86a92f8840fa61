//! Compact, URL-friendly text encoding of frame state.
//!
//! Element maps are written as `frame:el|el;frame:el`, where every element is
//! `id,componentName,x,y,isFrame,props` and `props` is URI-component encoded
//! JSON. Frame lists are comma separated. Parsing never fails: broken entries
//! are skipped and the rest of the input is kept.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use crate::model::{CustomProps, ElementMap, FrameElement};

const FRAME_SEPARATOR: char = ';';
const NAME_SEPARATOR: char = ':';
const ELEMENT_SEPARATOR: char = '|';
const FIELD_SEPARATOR: char = ',';
const FIELD_COUNT: usize = 6;

/// Same reserved set as `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const FALLBACK_PERCENT: f64 = 50.0;

/// Whether `value` can sit in an id, component or frame field without
/// being split apart on parse.
pub fn is_delimiter_free(value: &str) -> bool {
    !value.contains([FRAME_SEPARATOR, NAME_SEPARATOR, ELEMENT_SEPARATOR, FIELD_SEPARATOR])
}

pub fn serialize_elements(elements: &ElementMap) -> String {
    elements
        .iter()
        .map(|(frame, list)| {
            let entries = list
                .iter()
                .map(serialize_element)
                .collect::<Vec<_>>()
                .join(&ELEMENT_SEPARATOR.to_string());
            format!("{frame}{NAME_SEPARATOR}{entries}")
        })
        .collect::<Vec<_>>()
        .join(&FRAME_SEPARATOR.to_string())
}

fn serialize_element(element: &FrameElement) -> String {
    // serde_json cannot fail on a string-keyed map of JSON values
    let props = serde_json::to_string(&element.custom_props).unwrap_or_else(|_| "{}".into());
    format!(
        "{},{},{},{},{},{}",
        element.id,
        element.component_name,
        whole_percent(element.x_percent),
        whole_percent(element.y_percent),
        element.is_frame_or_container,
        utf8_percent_encode(&props, URI_COMPONENT),
    )
}

fn whole_percent(value: f64) -> i64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0).round() as i64
    } else {
        FALLBACK_PERCENT as i64
    }
}

pub fn parse_elements(raw: &str) -> ElementMap {
    let mut elements = ElementMap::new();

    for segment in raw.split(FRAME_SEPARATOR) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (frame, entries) = segment.split_once(NAME_SEPARATOR).unwrap_or((segment, ""));
        if frame.is_empty() {
            debug!(segment, "skipping frame segment without a name");
            continue;
        }

        let list = elements.entry(frame.to_string()).or_default();
        for entry in entries.split(ELEMENT_SEPARATOR).filter(|e| !e.is_empty()) {
            let Some(element) = parse_element(entry) else {
                debug!(frame, entry, "skipping malformed element entry");
                continue;
            };
            if list.iter().any(|existing| existing.id == element.id) {
                debug!(frame, id = %element.id, "dropping duplicate element id");
                continue;
            }
            list.push(element);
        }
    }

    elements
}

fn parse_element(entry: &str) -> Option<FrameElement> {
    let fields: Vec<&str> = entry.split(FIELD_SEPARATOR).collect();
    if fields.len() < FIELD_COUNT {
        return None;
    }

    let id = fields[0].trim();
    let component_name = fields[1].trim();
    if id.is_empty() || component_name.is_empty() {
        return None;
    }

    Some(FrameElement {
        id: id.to_string(),
        component_name: component_name.to_string(),
        x_percent: parse_percent(fields[2]),
        y_percent: parse_percent(fields[3]),
        is_frame_or_container: fields[4].trim() == "true",
        custom_props: parse_props(fields[5]),
    })
}

fn parse_percent(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value.clamp(0.0, 100.0),
        _ => FALLBACK_PERCENT,
    }
}

fn parse_props(raw: &str) -> CustomProps {
    let Ok(decoded) = percent_decode_str(raw).decode_utf8() else {
        return CustomProps::new();
    };
    serde_json::from_str(&decoded).unwrap_or_default()
}

pub fn serialize_frames(frames: &[String]) -> String {
    frames.join(",")
}

/// Parse a comma separated frame list, dropping blanks and repeats.
pub fn parse_frames(raw: &str) -> Vec<String> {
    let mut frames: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !frames.iter().any(|existing| existing == name) {
            frames.push(name.to_string());
        }
    }
    frames
}
