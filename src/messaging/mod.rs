mod links;
mod protocol;

pub use links::{fingerprint, ChildLink, ChildLinks, PushOutcome};
pub use protocol::{Envelope, FrameMessage, ProtocolError};
