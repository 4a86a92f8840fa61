use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use url::Url;

use super::{BrowserHistory, SessionStorage};

/// Session storage held in memory. Clones share the same backing map, so a
/// test can keep a handle while the host owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Rc<RefCell<StorageState>>,
}

#[derive(Debug, Default)]
struct StorageState {
    items: HashMap<String, String>,
    writes: HashMap<String, usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `key` has been written.
    pub fn write_count(&self, key: &str) -> usize {
        self.inner.borrow().writes.get(key).copied().unwrap_or(0)
    }
}

impl SessionStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.inner.borrow().items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) {
        let mut state = self.inner.borrow_mut();
        state.items.insert(key.to_string(), value.to_string());
        *state.writes.entry(key.to_string()).or_insert(0) += 1;
    }

    fn remove_item(&mut self, key: &str) {
        self.inner.borrow_mut().items.remove(key);
    }
}

/// Session history held in memory; clones share state.
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    inner: Rc<RefCell<HistoryState>>,
}

#[derive(Debug)]
struct HistoryState {
    entries: Vec<Url>,
    index: usize,
    pushes: usize,
    replaces: usize,
}

impl MemoryHistory {
    pub fn new(initial: Url) -> Self {
        Self {
            inner: Rc::new(RefCell::new(HistoryState {
                entries: vec![initial],
                index: 0,
                pushes: 0,
                replaces: 0,
            })),
        }
    }

    pub fn push_count(&self) -> usize {
        self.inner.borrow().pushes
    }

    pub fn replace_count(&self) -> usize {
        self.inner.borrow().replaces
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Step back one entry, as the browser back button does.
    pub fn back(&self) -> Option<Url> {
        let mut state = self.inner.borrow_mut();
        if state.index == 0 {
            return None;
        }
        state.index -= 1;
        Some(state.entries[state.index].clone())
    }
}

impl BrowserHistory for MemoryHistory {
    fn current_url(&self) -> Url {
        let state = self.inner.borrow();
        state.entries[state.index].clone()
    }

    fn push_state(&mut self, url: &Url) {
        let mut state = self.inner.borrow_mut();
        let keep = state.index + 1;
        state.entries.truncate(keep);
        state.entries.push(url.clone());
        state.index = keep;
        state.pushes += 1;
    }

    fn replace_state(&mut self, url: &Url) {
        let mut state = self.inner.borrow_mut();
        let index = state.index;
        state.entries[index] = url.clone();
        state.replaces += 1;
    }
}
