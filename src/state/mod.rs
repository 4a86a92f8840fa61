mod store;
mod view;

pub use store::{ContainerHandle, ContainerSlot, FrameStore, LoadedState};
pub use view::{FrameView, StatusBoard, SyncStatus};
