use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::codec::is_delimiter_free;
use crate::model::{CustomProps, ElementMap};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message has no string `type` field")]
    MissingType,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {kind} message: {reason}")]
    Invalid { kind: &'static str, reason: &'static str },
}

/// Every message exchanged between windows, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FrameMessage {
    /// child -> parent/opener: ready to receive `syncFrame`.
    IframeReady { frame_name: String },
    /// child -> parent: about to navigate; stop pushing until ready again.
    FrameNavStart { frame_name: String },
    /// parent -> child: authoritative lists for a frame and its nested frames.
    SyncFrame {
        frame_name: String,
        elements: ElementMap,
    },
    /// child -> top (relayed)
    FrameAdded { frame_name: String },
    /// child -> top (relayed)
    AddElement {
        frame_name: String,
        component_name: String,
        is_frame_or_container: bool,
        #[serde(default)]
        custom_props: CustomProps,
    },
    /// child -> top (relayed)
    RemoveElement {
        element_id: String,
        frame_name: String,
    },
    /// child -> top (relayed)
    UpdateElementPosition {
        element_id: String,
        frame_name: String,
        x_percent: f64,
        y_percent: f64,
    },
    /// child -> top: the child navigated to another logical page.
    FramePageChanged {
        frame_name: String,
        page_name: String,
    },
    /// child -> parent: push my subtree again even if unchanged.
    RequestSync { frame_name: String },
}

const KNOWN_TYPES: &[&str] = &[
    "iframeReady",
    "frameNavStart",
    "syncFrame",
    "frameAdded",
    "addElement",
    "removeElement",
    "updateElementPosition",
    "framePageChanged",
    "requestSync",
];

impl FrameMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            FrameMessage::IframeReady { .. } => "iframeReady",
            FrameMessage::FrameNavStart { .. } => "frameNavStart",
            FrameMessage::SyncFrame { .. } => "syncFrame",
            FrameMessage::FrameAdded { .. } => "frameAdded",
            FrameMessage::AddElement { .. } => "addElement",
            FrameMessage::RemoveElement { .. } => "removeElement",
            FrameMessage::UpdateElementPosition { .. } => "updateElementPosition",
            FrameMessage::FramePageChanged { .. } => "framePageChanged",
            FrameMessage::RequestSync { .. } => "requestSync",
        }
    }

    pub fn frame_name(&self) -> &str {
        match self {
            FrameMessage::IframeReady { frame_name }
            | FrameMessage::FrameNavStart { frame_name }
            | FrameMessage::SyncFrame { frame_name, .. }
            | FrameMessage::FrameAdded { frame_name }
            | FrameMessage::AddElement { frame_name, .. }
            | FrameMessage::RemoveElement { frame_name, .. }
            | FrameMessage::UpdateElementPosition { frame_name, .. }
            | FrameMessage::FramePageChanged { frame_name, .. }
            | FrameMessage::RequestSync { frame_name } => frame_name,
        }
    }

    /// Messages a popup that is its own top passes on to its opener.
    pub fn is_relayed_upstream(&self) -> bool {
        matches!(
            self,
            FrameMessage::FrameAdded { .. }
                | FrameMessage::AddElement { .. }
                | FrameMessage::RemoveElement { .. }
                | FrameMessage::UpdateElementPosition { .. }
                | FrameMessage::FramePageChanged { .. }
        )
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        let kind = self.kind();
        if self.frame_name().trim().is_empty() {
            return Err(ProtocolError::Invalid {
                kind,
                reason: "empty frameName",
            });
        }
        if !is_delimiter_free(self.frame_name()) {
            return Err(ProtocolError::Invalid {
                kind,
                reason: "frameName contains a state delimiter",
            });
        }
        match self {
            FrameMessage::RemoveElement { element_id, .. }
            | FrameMessage::UpdateElementPosition { element_id, .. }
                if element_id.trim().is_empty() =>
            {
                Err(ProtocolError::Invalid {
                    kind,
                    reason: "empty elementId",
                })
            }
            FrameMessage::UpdateElementPosition {
                x_percent, y_percent, ..
            } if !x_percent.is_finite() || !y_percent.is_finite() => Err(ProtocolError::Invalid {
                kind,
                reason: "non-finite position",
            }),
            FrameMessage::AddElement { component_name, .. } if component_name.trim().is_empty() => {
                Err(ProtocolError::Invalid {
                    kind,
                    reason: "empty componentName",
                })
            }
            FrameMessage::AddElement { component_name, .. } if !is_delimiter_free(component_name) => {
                Err(ProtocolError::Invalid {
                    kind,
                    reason: "componentName contains a state delimiter",
                })
            }
            FrameMessage::FramePageChanged { page_name, .. } if page_name.trim().is_empty() => {
                Err(ProtocolError::Invalid {
                    kind,
                    reason: "empty pageName",
                })
            }
            _ => Ok(()),
        }
    }
}

/// A message plus the number of windows that have relayed it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub message: FrameMessage,
    #[serde(default, rename = "relayHops", skip_serializing_if = "is_zero")]
    pub relay_hops: u8,
}

fn is_zero(hops: &u8) -> bool {
    *hops == 0
}

impl Envelope {
    pub fn new(message: FrameMessage) -> Self {
        Self {
            message,
            relay_hops: 0,
        }
    }

    /// Decode an untrusted `postMessage` payload: check the discriminant
    /// first, then the fields, then the values.
    pub fn decode(payload: &Value) -> Result<Self, ProtocolError> {
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        let envelope: Envelope =
            serde_json::from_value(payload.clone()).map_err(|source| ProtocolError::Malformed {
                kind: kind.to_string(),
                source,
            })?;
        envelope.message.validate()?;
        Ok(envelope)
    }

    pub fn encode(&self) -> Value {
        // a derived Serialize over strings, numbers and maps cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The same message one hop further up the chain.
    pub fn relayed(&self) -> Self {
        Self {
            message: self.message.clone(),
            relay_hops: self.relay_hops.saturating_add(1),
        }
    }
}

impl From<FrameMessage> for Envelope {
    fn from(message: FrameMessage) -> Self {
        Self::new(message)
    }
}
