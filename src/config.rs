use std::time::Duration;

use crate::error::ChannelError;

/// Default Cast v2 control port.
pub const DEFAULT_PORT: u16 = 8009;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Explicit, typed construction input for a [`crate::Channel`].
///
/// There is no file loading or environment-variable fallback here — the
/// embedder builds one of these directly. Validation happens once, at
/// [`crate::Channel::new`] time, so a misconfigured channel never gets as
/// far as opening a socket.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    /// Human-readable label for the remote device (logging only).
    pub remote_name: String,
    /// This client's sender identity, carried on every frame it emits.
    pub sender_id: String,
    pub request_timeout: Duration,
}

impl ChannelConfig {
    pub fn new(
        host: impl Into<String>,
        remote_name: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            remote_name: remote_name.into(),
            sender_id: sender_id.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ChannelError> {
        if self.host.trim().is_empty() {
            return Err(ChannelError::Config("host must not be blank".into()));
        }
        if self.sender_id.trim().is_empty() {
            return Err(ChannelError::Config("sender_id must not be blank".into()));
        }
        if self.remote_name.trim().is_empty() {
            return Err(ChannelError::Config("remote_name must not be blank".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_config() {
        let cfg = ChannelConfig::new("10.0.0.2", "Living Room TV", "sender-1");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.port, DEFAULT_PORT);
    }

    #[test]
    fn rejects_blank_host() {
        let cfg = ChannelConfig::new("   ", "Living Room TV", "sender-1");
        assert!(matches!(cfg.validate(), Err(ChannelError::Config(_))));
    }

    #[test]
    fn rejects_blank_sender_id() {
        let cfg = ChannelConfig::new("10.0.0.2", "Living Room TV", "");
        assert!(matches!(cfg.validate(), Err(ChannelError::Config(_))));
    }

    #[test]
    fn with_port_overrides_default() {
        let cfg = ChannelConfig::new("10.0.0.2", "Living Room TV", "sender-1").with_port(9009);
        assert_eq!(cfg.port, 9009);
    }
}
