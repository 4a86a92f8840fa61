use std::collections::BTreeSet;

use percent_encoding::percent_decode_str;
use url::Url;

pub const FRAMES_PREFIX: &str = "frames.";
pub const ELEMENTS_PREFIX: &str = "elements.";

pub fn frames_key(page: &str) -> String {
    format!("{FRAMES_PREFIX}{page}")
}

pub fn elements_key(page: &str) -> String {
    format!("{ELEMENTS_PREFIX}{page}")
}

/// Whether a key carries frame state (`frames.*` or `elements.*`).
pub fn is_frame_state_key(key: &str) -> bool {
    key.starts_with(FRAMES_PREFIX) || key.starts_with(ELEMENTS_PREFIX)
}

/// Logical page for a URL: its path without surrounding slashes, or
/// `default_page` for the site root.
pub fn page_name(url: &Url, default_page: &str) -> String {
    let path = percent_decode_str(url.path()).decode_utf8_lossy();
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        default_page.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Ordered query parameter set with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageParams {
    pairs: Vec<(String, String)>,
}

impl PageParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string (with or without the leading `?`). Repeated keys
    /// keep the last value; unparsable input yields an empty set.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let raw: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
        let mut params = Self::new();
        for (key, value) in raw {
            params.set(key, value);
        }
        params
    }

    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or(""))
    }

    pub fn to_query(&self) -> String {
        serde_urlencoded::to_string(&self.pairs).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(index).1)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.pairs.retain(|(k, v)| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// `self` overlaid with `newer`; keys present in `newer` win.
    pub fn merged_with(&self, newer: &PageParams) -> PageParams {
        let mut merged = self.clone();
        for (key, value) in newer.iter() {
            merged.set(key, value);
        }
        merged
    }

    /// Only the `frames.*` / `elements.*` entries.
    pub fn frame_state_only(&self) -> PageParams {
        let mut filtered = self.clone();
        filtered.retain(|key, _| is_frame_state_key(key));
        filtered
    }

    /// `(page, raw)` for every `elements.<page>` entry.
    pub fn element_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .filter_map(|(k, v)| k.strip_prefix(ELEMENTS_PREFIX).map(|page| (page, v)))
    }

    /// `(page, raw)` for every `frames.<page>` entry.
    pub fn frame_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .filter_map(|(k, v)| k.strip_prefix(FRAMES_PREFIX).map(|page| (page, v)))
    }

    /// Every page that has either a frame list or an element string.
    pub fn pages(&self) -> BTreeSet<String> {
        self.frame_entries()
            .chain(self.element_entries())
            .map(|(page, _)| page.to_string())
            .collect()
    }

    pub fn remove_page(&mut self, page: &str) {
        self.remove(&frames_key(page));
        self.remove(&elements_key(page));
    }
}
