//! Error types for the frame codec.

use thiserror::Error;

/// Errors surfaced while framing or unframing records.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame length prefix exceeds the configured maximum.
    #[error("frame of {len} bytes exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },

    /// The stream ended in the middle of a frame.
    #[error("stream ended mid-frame")]
    Truncated,

    #[error("error encoding frame payload: {0}")]
    Encode(String),

    #[error("error decoding frame payload: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
