//! Cast v2 control-protocol Channel.
//!
//! [`Channel`] is a long-lived, bidirectional, multiplexed session with a
//! single Cast v2 receiver: a device-auth handshake over TLS, a framed
//! binary envelope carrying either opaque binary payloads or JSON control
//! messages, request/response multiplexing keyed on a monotonic request
//! id, per-destination sub-sessions, and a heartbeat that keeps the TLS
//! session alive.
//!
//! Everything outside that core — device discovery, a media-library
//! model, a GUI — is left to the embedder; this crate only speaks the
//! wire protocol and exposes the receiver/media verbs built on top of it.

pub mod config;
pub mod envelope;
pub mod error;
pub mod listener;
pub mod messages;

mod channel;
mod frame;
mod heartbeat;
mod reader;
mod registry;
mod tls;
mod wire;

pub use channel::Channel;
pub use config::ChannelConfig;
pub use error::{ChannelError, ChannelResult};
pub use listener::{ChannelListener, NoopListener};
pub use messages::{
    CastRequest, CastResponse, MediaInformation, MediaStatusResponse, ReceiverStatusResponse,
    ResponseKind,
};
