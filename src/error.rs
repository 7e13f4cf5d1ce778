use std::io;

/// Every way a [`crate::Channel`] operation can fail.
///
/// Transport-level variants (`Io`, `Protocol`) tear the channel down; the
/// rest surface only to the caller that triggered them and leave the
/// channel running.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid channel configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("device auth failed: {0}")]
    Auth(String),

    #[error("failed to decode response as the expected kind: {0}")]
    Decode(String),

    #[error("receiver rejected request: {0}")]
    BadRequest(String),

    #[error("app launch failed: {0}")]
    Launch(String),

    #[error("media load failed")]
    MediaLoadFailed,

    #[error("request timed out")]
    RequestTimeout,

    #[error("channel was closed")]
    ChannelClosed,

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors specific to reading a single length-prefixed frame (C1).
///
/// Kept separate from [`ChannelError`] because the frame codec has no
/// notion of a channel or a registry — [`crate::reader`] converts these
/// into [`ChannelError::Protocol`] / [`ChannelError::Io`] as appropriate.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: {len} bytes (max {max})")]
    TooLarge { len: u32, max: u32 },

    #[error("incomplete message: read {read} of {expected}")]
    Incomplete { read: usize, expected: usize },
}

impl From<FrameError> for ChannelError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(e) => ChannelError::Io(e),
            other => ChannelError::Protocol(other.to_string()),
        }
    }
}
