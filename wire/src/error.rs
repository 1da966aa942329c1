//! Wire format error types.

use thiserror::Error;

/// Wire format errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Incomplete frame (need more data)
    #[error("incomplete frame")]
    Incomplete,

    /// Unexpected response command
    #[error("unexpected command {0}")]
    Command(u8),

    /// Unknown status code
    #[error("unknown status code {0}")]
    Status(u8),

    /// Device token has the wrong length
    #[error("invalid token length {0}, expected 64 hex characters")]
    TokenLength(usize),

    /// Device token is not hex encoded
    #[error("token is not hex encoded")]
    TokenHex,

    /// Encoded payload exceeds the legacy size limit
    #[error("payload size {0} exceeds limit")]
    PayloadSize(usize),

    /// Custom payload property name collides with an existing one
    #[error("custom property key {0:?} is already used")]
    CustomKey(String),

    /// Neither alert text nor the content-available flag is set
    #[error("alert message text or content-available flag must be set")]
    AlertMissing,

    /// Payload could not be serialized to JSON
    #[error("could not create json document: {0}")]
    Json(#[from] serde_json::Error),
}
