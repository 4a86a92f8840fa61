use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

/// Inbound queue of raw `postMessage` payloads for one window.
pub type Mailbox = mpsc::UnboundedReceiver<Value>;

/// A handle to another window that accepts `postMessage`.
///
/// Messages are always posted with target origin `"*"`; receivers validate
/// payload structure instead of sender origin.
pub trait WindowPort {
    fn post_message(&self, message: &Value);
}

impl<T: WindowPort + ?Sized> WindowPort for Box<T> {
    fn post_message(&self, message: &Value) {
        (**self).post_message(message)
    }
}

/// Port backed by an unbounded tokio channel, for in-process windows.
#[derive(Debug, Clone)]
pub struct ChannelPort {
    label: String,
    tx: mpsc::UnboundedSender<Value>,
}

impl ChannelPort {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl WindowPort for ChannelPort {
    fn post_message(&self, message: &Value) {
        if self.tx.send(message.clone()).is_err() {
            warn!(target_window = %self.label, "window closed; dropping message");
        }
    }
}

/// A port/mailbox pair: whatever is posted to the port lands in the mailbox.
pub fn window_channel(label: impl Into<String>) -> (ChannelPort, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelPort {
            label: label.into(),
            tx,
        },
        rx,
    )
}
