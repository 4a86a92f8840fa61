mod debounce;
mod engine;
mod origins;

pub use debounce::{SaveDebouncer, SavePhase};
pub use engine::{
    CommitReport, PersistenceEngine, LANDED_URL_KEY, LAST_SAVED_URL_KEY, SAVED_PARAMS_KEY,
};
pub use origins::{origin_key, origins, parse_origin_pages, serialize_origin_pages};
