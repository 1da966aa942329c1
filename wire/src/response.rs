//! Inbound frames: gateway error responses and feedback records.

use serde::{Deserialize, Serialize};

use crate::token::{DeviceToken, TOKEN_BINARY_SIZE};
use crate::WireError;

/// Command byte of the gateway error response
pub const ERROR_RESPONSE_COMMAND: u8 = 8;

/// Error response size in bytes
pub const ERROR_RESPONSE_SIZE: usize = 6;

/// Feedback record size in bytes
pub const FEEDBACK_RECORD_SIZE: usize = 38;

/// Status codes the gateway reports in an error response
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApnsStatus {
    /// Internal processing error
    ProcessingError = 1,
    /// Notification frame carried no device token
    MissingDeviceToken = 2,
    /// Notification frame carried no topic
    MissingTopic = 3,
    /// Notification frame carried no payload
    MissingPayload = 4,
    /// Device token item had the wrong size
    InvalidTokenSize = 5,
    /// Topic item had the wrong size
    InvalidTopicSize = 6,
    /// Payload item exceeded the size limit
    InvalidPayloadSize = 7,
    /// Device token was rejected as invalid
    InvalidToken = 8,
    /// The gateway is shutting down
    ServiceShutdown = 10,
    /// No error (never observed on the wire)
    None = 255,
}

impl TryFrom<u8> for ApnsStatus {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            1 => Ok(ApnsStatus::ProcessingError),
            2 => Ok(ApnsStatus::MissingDeviceToken),
            3 => Ok(ApnsStatus::MissingTopic),
            4 => Ok(ApnsStatus::MissingPayload),
            5 => Ok(ApnsStatus::InvalidTokenSize),
            6 => Ok(ApnsStatus::InvalidTopicSize),
            7 => Ok(ApnsStatus::InvalidPayloadSize),
            8 => Ok(ApnsStatus::InvalidToken),
            10 => Ok(ApnsStatus::ServiceShutdown),
            255 => Ok(ApnsStatus::None),
            _ => Err(WireError::Status(value)),
        }
    }
}

/// The 6-byte error response the gateway emits just before closing the
/// connection.
///
/// The identifier names the notification that failed. Per the protocol it is
/// only meaningful when `status` is [`ApnsStatus::InvalidToken`]; it is
/// decoded unconditionally and callers decide whether to trust it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Raw status code
    pub status: u8,
    /// Notification identifier the status refers to
    pub identifier: u32,
}

impl ErrorResponse {
    /// Parse an error response from the wire
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < ERROR_RESPONSE_SIZE {
            return Err(WireError::Incomplete);
        }
        if buf[0] != ERROR_RESPONSE_COMMAND {
            return Err(WireError::Command(buf[0]));
        }
        Ok(Self {
            status: buf[1],
            identifier: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
        })
    }

    /// The status as a known enum value, if it is one
    pub fn known_status(&self) -> Option<ApnsStatus> {
        ApnsStatus::try_from(self.status).ok()
    }
}

/// One 38-byte record from the Feedback Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackRecord {
    /// When the service determined the device is gone (epoch seconds)
    pub timestamp: u32,
    /// The undeliverable device token
    pub token: DeviceToken,
}

impl FeedbackRecord {
    /// Parse a feedback record from the wire.
    ///
    /// The token length field is decoded but not validated; the service
    /// always writes 32.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < FEEDBACK_RECORD_SIZE {
            return Err(WireError::Incomplete);
        }
        let timestamp = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let _token_len = u16::from_be_bytes([buf[4], buf[5]]);
        let mut token = [0u8; TOKEN_BINARY_SIZE];
        token.copy_from_slice(&buf[6..6 + TOKEN_BINARY_SIZE]);
        Ok(Self {
            timestamp,
            token: DeviceToken::from(token),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_frame(status: u8, id: u32) -> [u8; ERROR_RESPONSE_SIZE] {
        let mut frame = [0u8; ERROR_RESPONSE_SIZE];
        frame[0] = ERROR_RESPONSE_COMMAND;
        frame[1] = status;
        frame[2..6].copy_from_slice(&id.to_be_bytes());
        frame
    }

    #[test]
    fn test_error_response_parse() {
        let response = ErrorResponse::parse(&error_frame(8, 42)).unwrap();
        assert_eq!(response.status, 8);
        assert_eq!(response.identifier, 42);
        assert_eq!(response.known_status(), Some(ApnsStatus::InvalidToken));
    }

    #[test]
    fn test_error_response_unknown_status() {
        let response = ErrorResponse::parse(&error_frame(9, 0)).unwrap();
        assert_eq!(response.known_status(), None);
    }

    #[test]
    fn test_error_response_wrong_command() {
        let mut frame = error_frame(8, 1);
        frame[0] = 7;
        assert!(matches!(
            ErrorResponse::parse(&frame),
            Err(WireError::Command(7))
        ));
    }

    #[test]
    fn test_error_response_incomplete() {
        assert!(matches!(
            ErrorResponse::parse(&[8, 8]),
            Err(WireError::Incomplete)
        ));
    }

    #[test]
    fn test_feedback_record_parse() {
        let mut buf = [0u8; FEEDBACK_RECORD_SIZE];
        buf[0..4].copy_from_slice(&1_600_000_000u32.to_be_bytes());
        buf[4..6].copy_from_slice(&(TOKEN_BINARY_SIZE as u16).to_be_bytes());
        buf[6..].copy_from_slice(&[0xcd; TOKEN_BINARY_SIZE]);

        let record = FeedbackRecord::parse(&buf).unwrap();
        assert_eq!(record.timestamp, 1_600_000_000);
        assert_eq!(record.token.to_hex(), "cd".repeat(32));
    }

    #[test]
    fn test_feedback_record_incomplete() {
        assert!(matches!(
            FeedbackRecord::parse(&[0u8; 10]),
            Err(WireError::Incomplete)
        ));
    }
}
