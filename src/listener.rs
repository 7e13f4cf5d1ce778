use serde_json::Value;

/// Callbacks for activity the [`crate::Channel`] was not asked for:
/// connection state flips, spontaneous receiver/media events outside the
/// request/response flow, and custom-namespace traffic.
///
/// All methods default to doing nothing, so an embedder only overrides
/// what it cares about.
pub trait ChannelListener: Send + Sync {
    /// Fired whenever the channel transitions to or away from `CONNECTED`.
    fn on_connection_state(&self, connected: bool) {
        let _ = connected;
    }

    /// A `receiver`/`media` namespace STRING message that did not match
    /// any outstanding request id.
    fn on_spontaneous_event(&self, message: Value) {
        let _ = message;
    }

    /// A STRING message on a namespace this crate does not interpret.
    fn on_string_custom_event(&self, namespace: &str, payload: &str) {
        let _ = (namespace, payload);
    }

    /// A BINARY message on a namespace this crate does not interpret.
    fn on_binary_event(&self, namespace: &str, payload: &[u8]) {
        let _ = (namespace, payload);
    }
}

/// A listener that does nothing, used when an embedder has no use for
/// spontaneous events.
pub struct NoopListener;

impl ChannelListener for NoopListener {}
