// Library exports for the builder runtime and tests

pub mod codec;
pub mod config;
pub mod env;
pub mod gc;
pub mod host;
pub mod ids;
pub mod messaging;
pub mod model;
pub mod params;
pub mod persistence;
pub mod state;

pub use config::{ConfigError, SyncConfig};
pub use host::{FrameHost, HostError, WindowPlacement, WindowRole};
pub use messaging::{Envelope, FrameMessage, ProtocolError};
pub use model::{CustomProps, ElementMap, FrameElement, ROOT_FRAME};
pub use params::PageParams;
pub use state::{FrameStore, FrameView, SyncStatus};
