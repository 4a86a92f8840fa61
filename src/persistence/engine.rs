use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};
use url::Url;

use crate::codec::{parse_elements, parse_frames, serialize_elements, serialize_frames};
use crate::config::SyncConfig;
use crate::env::{BrowserHistory, SessionStorage};
use crate::gc;
use crate::model::ElementMap;
use crate::params::{elements_key, frames_key, page_name, PageParams};
use crate::state::{FrameStore, LoadedState};

use super::origins::{origin_key, origins, parse_origin_pages, serialize_origin_pages};

pub const SAVED_PARAMS_KEY: &str = "savedPageParams";
pub const LAST_SAVED_URL_KEY: &str = "lastSavedUrl";
pub const LANDED_URL_KEY: &str = "landedUrl";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub pages_written: Vec<String>,
    pub pages_cleared: Vec<String>,
    pub url: String,
}

/// Reads and writes the top window's URL and session snapshot.
pub struct PersistenceEngine {
    storage: Box<dyn SessionStorage>,
    history: Box<dyn BrowserHistory>,
    root: String,
    default_page: String,
}

impl PersistenceEngine {
    pub fn new(
        storage: Box<dyn SessionStorage>,
        history: Box<dyn BrowserHistory>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            storage,
            history,
            root: config.root_frame.clone(),
            default_page: config.default_page.clone(),
        }
    }

    pub fn current_url(&self) -> Url {
        self.history.current_url()
    }

    pub fn current_page(&self) -> String {
        page_name(&self.current_url(), &self.default_page)
    }

    pub fn session_params(&self) -> PageParams {
        self.storage
            .get_item(SAVED_PARAMS_KEY)
            .map(|raw| PageParams::from_query(&raw))
            .unwrap_or_default()
    }

    /// Session snapshot overlaid with the current URL query (URL wins).
    pub fn snapshot(&self) -> PageParams {
        self.session_params()
            .merged_with(&PageParams::from_url(&self.current_url()))
    }

    /// Boot-time restore of the current page's frames and elements.
    pub fn load(&mut self) -> LoadedState {
        let url = self.current_url();
        let page = page_name(&url, &self.default_page);
        let url_params = PageParams::from_url(&url);
        let href = url.as_str();

        let last_saved = self.storage.get_item(LAST_SAVED_URL_KEY);
        let landed = self.storage.get_item(LANDED_URL_KEY);
        let shared_link = last_saved.as_deref() != Some(href) && landed.as_deref() != Some(href);

        let session = if shared_link {
            info!(url = %href, "opened from an external link; discarding previous session state");
            url_params.frame_state_only()
        } else {
            self.session_params().merged_with(&url_params)
        };
        self.storage.set_item(SAVED_PARAMS_KEY, &session.to_query());
        self.storage.set_item(LANDED_URL_KEY, href);

        let frames_raw = url_params
            .get(&frames_key(&page))
            .or_else(|| session.get(&frames_key(&page)));
        let elements_raw = url_params
            .get(&elements_key(&page))
            .or_else(|| session.get(&elements_key(&page)));

        let (mut frames, mut elements) = if frames_raw.is_none() && elements_raw.is_none() {
            (Vec::new(), ElementMap::new())
        } else {
            (
                parse_frames(frames_raw.unwrap_or("")),
                parse_elements(elements_raw.unwrap_or("")),
            )
        };

        if !frames.contains(&self.root) {
            frames.insert(0, self.root.clone());
        }
        elements.entry(self.root.clone()).or_default();

        debug!(page = %page, frames = frames.len(), "restored frame state");
        LoadedState {
            page,
            frames,
            elements,
        }
    }

    /// Write every dirty frame into its page's parameters, then persist the
    /// merged snapshot to session storage and replace the URL. Clears the
    /// store's dirty set.
    pub fn commit(&mut self, store: &mut FrameStore) -> CommitReport {
        let mut snapshot = self.snapshot();
        let dirty = store.dirty_frames().clone();
        let mut report = CommitReport::default();

        for page in store.pages() {
            let mut frames = vec![self.root.clone()];
            let persisted_frames = parse_frames(snapshot.get(&frames_key(&page)).unwrap_or(""));
            for frame in persisted_frames.into_iter().chain(store.frames_on_page(&page)) {
                if !frames.contains(&frame) {
                    frames.push(frame);
                }
            }

            let mut previous = parse_elements(snapshot.get(&elements_key(&page)).unwrap_or(""));
            let mut elements = ElementMap::new();
            for frame in &frames {
                let owned_here = store.page_of(frame) == Some(page.as_str());
                let list = if owned_here && dirty.contains(frame) {
                    store.elements_of(frame).to_vec()
                } else {
                    previous.remove(frame).unwrap_or_default()
                };
                elements.insert(frame.clone(), list);
            }
            // element lists recorded without a frame-list entry are kept as-is
            elements.extend(previous);

            let only_empty_root = frames.len() == 1
                && elements.len() == 1
                && elements.values().all(Vec::is_empty);
            if only_empty_root {
                if snapshot.contains(&frames_key(&page)) || snapshot.contains(&elements_key(&page)) {
                    report.pages_cleared.push(page.clone());
                }
                snapshot.remove_page(&page);
                continue;
            }

            snapshot.set(frames_key(&page), serialize_frames(&frames));
            snapshot.set(elements_key(&page), serialize_elements(&elements));
            report.pages_written.push(page);
        }

        report.url = self.write_snapshot(&snapshot).to_string();
        store.clear_dirty();
        debug!(
            written = report.pages_written.len(),
            cleared = report.pages_cleared.len(),
            "committed frame state"
        );
        report
    }

    /// Remove `removed` frames from every persisted page immediately, so a
    /// stale entry cannot bring them back on the next save.
    pub fn scrub(&mut self, removed: &BTreeSet<String>) -> usize {
        if removed.is_empty() {
            return 0;
        }
        let mut snapshot = self.snapshot();
        let changed = gc::scrub_persisted(&mut snapshot, removed, &self.root);
        if changed > 0 {
            self.write_snapshot(&snapshot);
        }
        changed
    }

    /// Persisted element lists for `page`.
    pub fn page_elements(&self, page: &str) -> ElementMap {
        parse_elements(self.snapshot().get(&elements_key(page)).unwrap_or(""))
    }

    /// Record an in-app navigation target so the next boot at `url` is not
    /// mistaken for an externally shared link.
    pub fn note_navigation(&mut self, url: &Url) {
        self.storage.set_item(LANDED_URL_KEY, url.as_str());
    }

    pub fn origin_pages(&self, index: u32) -> Vec<String> {
        self.snapshot()
            .get(&origin_key(index))
            .map(parse_origin_pages)
            .unwrap_or_default()
    }

    /// Page lists of every registered origin, keyed by N.
    pub fn all_origins(&self) -> BTreeMap<u32, Vec<String>> {
        origins(&self.snapshot())
    }

    /// Add `page` to the Nth origin's page list and persist right away.
    pub fn add_origin_page(&mut self, index: u32, page: &str) -> Vec<String> {
        let mut snapshot = self.snapshot();
        let mut pages = snapshot
            .get(&origin_key(index))
            .map(parse_origin_pages)
            .unwrap_or_default();
        if !pages.iter().any(|known| known == page) {
            pages.push(page.to_string());
            snapshot.set(origin_key(index), serialize_origin_pages(&pages));
            self.write_snapshot(&snapshot);
        }
        pages
    }

    fn write_snapshot(&mut self, snapshot: &PageParams) -> Url {
        let query = snapshot.to_query();
        self.storage.set_item(SAVED_PARAMS_KEY, &query);

        let mut url = self.current_url();
        if query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&query));
        }
        self.history.replace_state(&url);
        self.storage.set_item(LAST_SAVED_URL_KEY, url.as_str());
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{MemoryHistory, MemoryStorage};
    use crate::model::{CustomProps, FrameElement, ROOT_FRAME};

    fn engine_at(url: &str) -> (PersistenceEngine, MemoryStorage, MemoryHistory) {
        let storage = MemoryStorage::new();
        let history = MemoryHistory::new(Url::parse(url).unwrap());
        let engine = PersistenceEngine::new(
            Box::new(storage.clone()),
            Box::new(history.clone()),
            &SyncConfig::default(),
        );
        (engine, storage, history)
    }

    #[test]
    fn empty_url_loads_bare_root() {
        let (mut engine, _, _) = engine_at("https://builder.test/");
        let loaded = engine.load();
        assert_eq!(loaded.page, "home");
        assert_eq!(loaded.frames, vec![ROOT_FRAME.to_string()]);
        assert_eq!(loaded.elements.len(), 1);
        assert!(loaded.elements[ROOT_FRAME].is_empty());
    }

    #[test]
    fn commit_writes_dirty_frames_and_keeps_hash() {
        let (mut engine, storage, history) = engine_at("https://builder.test/#section");
        let mut store = FrameStore::new(&SyncConfig::default(), "home");
        store.hydrate(engine.load());
        let persisted = engine.snapshot();
        store.add_element_to_frame(ROOT_FRAME, "Panel", false, CustomProps::new(), &persisted).unwrap();

        let report = engine.commit(&mut store);

        assert_eq!(report.pages_written, vec!["home".to_string()]);
        let url = history.current_url();
        assert_eq!(url.fragment(), Some("section"));
        let params = PageParams::from_url(&url);
        assert_eq!(params.get("frames.home"), Some("TopFrame"));
        assert_eq!(
            params.get("elements.home"),
            Some("TopFrame:Panel-1,Panel,50,50,false,%7B%7D")
        );
        assert_eq!(history.push_count(), 0);
        assert_eq!(
            storage.get_item(LAST_SAVED_URL_KEY).as_deref(),
            Some(url.as_str())
        );
        assert!(!store.is_dirty());
    }

    #[test]
    fn commit_drops_pages_left_with_an_empty_root() {
        let (mut engine, _, history) = engine_at(
            "https://builder.test/?frames.home=TopFrame&elements.home=TopFrame%3APanel-1%2CPanel%2C5%2C5%2Cfalse%2C%257B%257D",
        );
        let mut store = FrameStore::new(&SyncConfig::default(), "home");
        store.hydrate(engine.load());
        store.remove_element_from_frame(ROOT_FRAME, "Panel-1").unwrap();

        let report = engine.commit(&mut store);

        assert_eq!(report.pages_cleared, vec!["home".to_string()]);
        assert_eq!(history.current_url().query(), None);
    }

    #[test]
    fn commit_keeps_clean_frames_from_the_snapshot() {
        let mut other = ElementMap::new();
        other.insert(ROOT_FRAME.into(), vec![FrameElement::new("Panel-4", "Panel", false)]);
        let (mut engine, mut storage, _) = engine_at("https://builder.test/");
        let mut session = PageParams::new();
        session.set("frames.pricing", "TopFrame");
        session.set("elements.pricing", serialize_elements(&other));
        storage.set_item(SAVED_PARAMS_KEY, &session.to_query());
        storage.set_item(LANDED_URL_KEY, "https://builder.test/");

        let mut store = FrameStore::new(&SyncConfig::default(), "home");
        store.hydrate(engine.load());
        let persisted = engine.snapshot();
        let id = store.add_element_to_frame(ROOT_FRAME, "Panel", false, CustomProps::new(), &persisted).unwrap();
        assert_eq!(id, "Panel-5");

        engine.commit(&mut store);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.get("elements.pricing"), session.get("elements.pricing"));
        assert!(snapshot.get("elements.home").unwrap().contains("Panel-5"));
    }

    #[test]
    fn origin_pages_are_persisted_immediately() {
        let (mut engine, _, history) = engine_at("https://builder.test/");
        engine.load();
        engine.add_origin_page(0, "pricing");
        let pages = engine.add_origin_page(0, "docs");
        assert_eq!(pages, vec!["pricing".to_string(), "docs".to_string()]);
        assert_eq!(
            PageParams::from_url(&history.current_url()).get("origin0"),
            Some("pricing|docs")
        );
        assert_eq!(engine.origin_pages(0), pages);
        assert_eq!(engine.all_origins().len(), 1);
    }
}
