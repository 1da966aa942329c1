//! Wire formats for the legacy Apple Push Notification Service binary protocol.
//!
//! This crate implements the byte-level formats exchanged with the legacy
//! APNs gateway (port 2195) and the companion Feedback Service (port 2196):
//! the enhanced binary notification frame, the asynchronous error response,
//! the feedback record, device-token conversion, and the notification
//! payload JSON.
//!
//! ## Wire formats
//!
//! Notification frame (sent to the gateway):
//!
//! ```text
//! +------------------+----------------------------------+
//! | u8  command = 2  |                                  |
//! | u32 frame_len    | length of the items that follow  |
//! +------------------+----------------------------------+
//! | item 1           | device token (32 bytes)          |
//! | item 2           | payload JSON (<= 2 KiB)          |
//! | item 3           | notification identifier (u32)    |
//! | item 4           | expiration date (u32, epoch s)   |
//! | item 5           | priority (u8, 10 or 5)           |
//! +------------------+----------------------------------+
//! item := u8 item_id | u16 item_len | item_len bytes
//! ```
//!
//! Error response (received, right before the gateway closes the socket):
//!
//! ```text
//! u8 command = 8 | u8 status | u32 identifier (big-endian)
//! ```
//!
//! Feedback record (received from the Feedback Service):
//!
//! ```text
//! u32 timestamp | u16 token_len = 32 | 32 token bytes
//! ```
//!
//! All multi-byte integers are big-endian.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod message;
pub mod payload;
pub mod response;
pub mod token;

pub use error::WireError;
pub use message::{BinaryMessage, NOTIFICATION_COMMAND};
pub use payload::{Payload, Priority, PAYLOAD_MAX_SIZE};
pub use response::{
    ApnsStatus, ErrorResponse, FeedbackRecord, ERROR_RESPONSE_COMMAND, ERROR_RESPONSE_SIZE,
    FEEDBACK_RECORD_SIZE,
};
pub use token::{DeviceToken, TOKEN_BINARY_SIZE, TOKEN_HEX_LENGTH};
