//! Client error taxonomy.
//!
//! Every failure the client can surface is one variant of [`ApnsError`].
//! Each variant carries a stable numeric code, disjoint from the OS errno
//! space, so callers integrating with errno-style plumbing can round-trip
//! through [`ApnsError::code`] and [`error_string`].

use apns_wire::{ApnsStatus, WireError};
use thiserror::Error;

/// Errors surfaced by the client
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApnsError {
    /// Process-wide initialization failed
    #[error("unable to initialize library")]
    FailedInit,

    /// No open connection to the delivery gateway
    #[error("no opened connection to Apple Push Notification Service")]
    NotConnected,

    /// No open connection to the Feedback Service
    #[error("no opened connection to Apple Feedback Service")]
    NotConnectedFeedback,

    /// The peer closed the connection
    #[error("connection was closed")]
    ConnectionClosed,

    /// The connection timed out
    #[error("connection timed out")]
    ConnectionTimedOut,

    /// The network is unreachable
    #[error("network unreachable")]
    NetworkUnreachable,

    /// A device token was rejected as invalid
    #[error("invalid device token")]
    TokenInvalid,

    /// Too many device tokens in one batch
    #[error("too many device tokens")]
    TokenTooMany,

    /// No certificate configured
    #[error("certificate is not set")]
    CertificateNotSet,

    /// No private key configured
    #[error("private key is not set")]
    PrivateKeyNotSet,

    /// The configured certificate could not be used
    #[error("unable to use specified SSL certificate")]
    BadCertificate,

    /// The configured private key could not be used
    #[error("unable to use specified private key")]
    BadPrivateKey,

    /// The configured PKCS#12 bundle could not be used
    #[error("unable to use specified PKCS12 file")]
    BadPkcs12,

    /// TCP connection establishment failed
    #[error("could not initialize connection")]
    CouldNotInitializeConnection,

    /// TLS session establishment failed
    #[error("could not initialize ssl connection")]
    CouldNotInitializeSslConnection,

    /// A TLS write failed
    #[error("TLS write failed")]
    TlsWriteFailed,

    /// A TLS read failed
    #[error("TLS read failed")]
    TlsReadFailed,

    /// The payload exceeds the gateway's size limit
    #[error("invalid notification payload size")]
    InvalidPayloadSize,

    /// A custom payload property name was already used
    #[error("specified custom property name is already used")]
    PayloadCustomKeyUsed,

    /// The payload could not be serialized to JSON
    #[error("could not create json document")]
    PayloadJson,

    /// The payload had neither alert text nor the content-available flag
    #[error("alert message text or content-available flag must be set")]
    PayloadAlertMissing,

    /// A string contained non-UTF-8 data
    #[error("non-UTF8 symbols detected in a string")]
    NonUtf8String,

    /// The gateway reported an internal processing error
    #[error("processing error")]
    ProcessingError,

    /// The gateway is shutting down
    #[error("server closed the connection (service shutdown)")]
    ServiceShutdown,

    /// Unclassified failure
    #[error("unknown error")]
    Unknown,
}

impl From<WireError> for ApnsError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::PayloadSize(_) => ApnsError::InvalidPayloadSize,
            WireError::CustomKey(_) => ApnsError::PayloadCustomKeyUsed,
            WireError::Json(_) => ApnsError::PayloadJson,
            WireError::AlertMissing => ApnsError::PayloadAlertMissing,
            WireError::TokenLength(_) | WireError::TokenHex => ApnsError::TokenInvalid,
            _ => ApnsError::Unknown,
        }
    }
}

impl ApnsError {
    /// Map a raw gateway status code into the local taxonomy.
    ///
    /// Statuses the gateway defines but this client has no recovery policy
    /// for collapse into [`ApnsError::Unknown`].
    pub fn from_status(status: u8) -> Self {
        match ApnsStatus::try_from(status) {
            Ok(ApnsStatus::ProcessingError) => ApnsError::ProcessingError,
            Ok(ApnsStatus::InvalidPayloadSize) => ApnsError::InvalidPayloadSize,
            Ok(ApnsStatus::InvalidToken) | Ok(ApnsStatus::InvalidTokenSize) => {
                ApnsError::TokenInvalid
            }
            Ok(ApnsStatus::ServiceShutdown) => ApnsError::ServiceShutdown,
            _ => ApnsError::Unknown,
        }
    }

    /// Stable numeric code for this error
    pub fn code(&self) -> u32 {
        match self {
            ApnsError::FailedInit => 9000,
            ApnsError::NotConnected => 9001,
            ApnsError::NotConnectedFeedback => 9002,
            ApnsError::ConnectionClosed => 9003,
            ApnsError::ConnectionTimedOut => 9004,
            ApnsError::NetworkUnreachable => 9005,
            ApnsError::TokenInvalid => 9006,
            ApnsError::TokenTooMany => 9007,
            ApnsError::CertificateNotSet => 9008,
            ApnsError::PrivateKeyNotSet => 9009,
            ApnsError::BadCertificate => 9010,
            ApnsError::BadPrivateKey => 9011,
            ApnsError::BadPkcs12 => 9012,
            ApnsError::CouldNotInitializeConnection => 9013,
            ApnsError::CouldNotInitializeSslConnection => 9014,
            ApnsError::TlsWriteFailed => 9015,
            ApnsError::TlsReadFailed => 9016,
            ApnsError::InvalidPayloadSize => 9017,
            ApnsError::PayloadCustomKeyUsed => 9019,
            ApnsError::PayloadJson => 9020,
            ApnsError::NonUtf8String => 9021,
            ApnsError::ProcessingError => 9022,
            ApnsError::ServiceShutdown => 9023,
            ApnsError::PayloadAlertMissing => 9024,
            ApnsError::Unknown => 9025,
        }
    }
}

/// Render the human-readable message for a numeric error code.
///
/// Codes outside the client's range fall through to the platform's
/// string-for-errno rendering.
pub fn error_string(code: u32) -> String {
    let message = match code {
        9000 => "unable to initialize library",
        9001 => "no opened connection to Apple Push Notification Service",
        9002 => "no opened connection to Apple Feedback Service",
        9003 => "connection was closed",
        9004 => "connection timed out",
        9005 => "network unreachable",
        9006 => "invalid device token",
        9007 => "too many device tokens",
        9008 => "certificate is not set",
        9009 => "private key is not set",
        9010 => "unable to use specified SSL certificate",
        9011 => "unable to use specified private key",
        9012 => "unable to use specified PKCS12 file",
        9013 => "could not initialize connection",
        9014 => "could not initialize ssl connection",
        9015 => "TLS write failed",
        9016 => "TLS read failed",
        9017 => "invalid notification payload size",
        9018 => "incorrect number to display as the badge on application icon",
        9019 => "specified custom property name is already used",
        9020 => "could not create json document",
        9021 => "non-UTF8 symbols detected in a string",
        9022 => "processing error",
        9023 => "server closed the connection (service shutdown)",
        9024 => "alert message text or content-available flag must be set",
        9025 => "unknown error",
        _ => return std::io::Error::from_raw_os_error(code as i32).to_string(),
    };
    message.to_string()
}

/// A failed batch delivery.
///
/// Carries the terminal error plus the tokens the gateway rejected before
/// the batch failed, so partial progress is not lost to the caller.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct SendError {
    /// The error that terminated the batch
    pub error: ApnsError,
    /// Tokens rejected as invalid before the batch terminated
    pub invalid_tokens: Vec<String>,
}
