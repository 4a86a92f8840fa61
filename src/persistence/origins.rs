//! `origin<N>` parameters: pipe separated page names known under the Nth
//! registered cross-window origin, used by the navigation menu.

use std::collections::BTreeMap;

use crate::params::PageParams;

const ORIGIN_PREFIX: &str = "origin";

pub fn origin_key(index: u32) -> String {
    format!("{ORIGIN_PREFIX}{index}")
}

pub fn parse_origin_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = Vec::new();
    for page in raw.split('|').map(str::trim).filter(|p| !p.is_empty()) {
        if !pages.iter().any(|known| known == page) {
            pages.push(page.to_string());
        }
    }
    pages
}

pub fn serialize_origin_pages(pages: &[String]) -> String {
    pages.join("|")
}

/// Every `origin<N>` entry, keyed by N.
pub fn origins(params: &PageParams) -> BTreeMap<u32, Vec<String>> {
    params
        .iter()
        .filter_map(|(key, value)| {
            let index = key.strip_prefix(ORIGIN_PREFIX)?.parse::<u32>().ok()?;
            Some((index, parse_origin_pages(value)))
        })
        .collect()
}
