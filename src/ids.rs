use std::collections::HashMap;

use crate::codec::parse_elements;
use crate::model::{ElementMap, FrameElement};
use crate::params::PageParams;

/// Mints `<componentName>-<n>` identifiers that stay unique across every
/// frame and every persisted page.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    known_max: HashMap<String, u64>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the suffixes of restored or synced elements.
    pub fn record<'a>(&mut self, elements: impl IntoIterator<Item = &'a FrameElement>) {
        for element in elements {
            if let Some(suffix) = suffix_of(&element.id, &element.component_name) {
                self.bump(&element.component_name, suffix);
            }
        }
    }

    /// Highest suffix for `component_name` seen in memory, in every persisted
    /// page, or previously handed out.
    pub fn scan(&self, component_name: &str, in_memory: &ElementMap, persisted: &PageParams) -> u64 {
        let mut max = self.known_max.get(component_name).copied().unwrap_or(0);

        let mut observe = |list: &[FrameElement]| {
            for element in list {
                if element.component_name != component_name {
                    continue;
                }
                if let Some(suffix) = suffix_of(&element.id, component_name) {
                    max = max.max(suffix);
                }
            }
        };

        for list in in_memory.values() {
            observe(list.as_slice());
        }
        for (_, raw) in persisted.element_entries() {
            for list in parse_elements(raw).values() {
                observe(list.as_slice());
            }
        }

        max
    }

    /// `None` once every suffix for `component_name` has been handed out.
    pub fn next_suffix(
        &mut self,
        component_name: &str,
        in_memory: &ElementMap,
        persisted: &PageParams,
    ) -> Option<u64> {
        let next = self
            .scan(component_name, in_memory, persisted)
            .checked_add(1)
            .filter(|next| *next < u64::MAX)?;
        self.bump(component_name, next);
        Some(next)
    }

    pub fn next_id(
        &mut self,
        component_name: &str,
        in_memory: &ElementMap,
        persisted: &PageParams,
    ) -> Option<String> {
        let suffix = self.next_suffix(component_name, in_memory, persisted)?;
        Some(format!("{component_name}-{suffix}"))
    }

    fn bump(&mut self, component_name: &str, suffix: u64) {
        let entry = self.known_max.entry(component_name.to_string()).or_insert(0);
        *entry = (*entry).max(suffix);
    }
}

/// Trailing integer of `<component>-<n>`; ids of other components never match.
/// `u64::MAX` is never minted, so a restored id carrying it is not ours.
pub fn suffix_of(id: &str, component_name: &str) -> Option<u64> {
    id.strip_prefix(component_name)?
        .strip_prefix('-')?
        .parse()
        .ok()
        .filter(|suffix| *suffix < u64::MAX)
}
