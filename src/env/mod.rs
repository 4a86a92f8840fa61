//! The browser-like collaborators the core runs against.
//!
//! Each window supplies its own session storage, history and ports to the
//! windows it talks to. Nothing here is shared between windows.

mod history;
mod memory;
mod window;

use url::Url;

pub use history::{HistoryChange, HistoryChangeKind, TrackedHistory};
pub use memory::{MemoryHistory, MemoryStorage};
pub use window::{window_channel, ChannelPort, Mailbox, WindowPort};

pub trait SessionStorage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str);
    fn remove_item(&mut self, key: &str);
}

pub trait BrowserHistory {
    fn current_url(&self) -> Url;
    fn push_state(&mut self, url: &Url);
    fn replace_state(&mut self, url: &Url);
}

impl<T: SessionStorage + ?Sized> SessionStorage for Box<T> {
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&mut self, key: &str, value: &str) {
        (**self).set_item(key, value)
    }

    fn remove_item(&mut self, key: &str) {
        (**self).remove_item(key)
    }
}

impl<T: BrowserHistory + ?Sized> BrowserHistory for Box<T> {
    fn current_url(&self) -> Url {
        (**self).current_url()
    }

    fn push_state(&mut self, url: &Url) {
        (**self).push_state(url)
    }

    fn replace_state(&mut self, url: &Url) {
        (**self).replace_state(url)
    }
}
