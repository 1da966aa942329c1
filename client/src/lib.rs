//! Client for the legacy Apple Push Notification Service binary protocol
//! and the companion Feedback Service.
//!
//! A [`Client`] holds TLS credentials (PEM or PKCS#12), a sandbox/production
//! [`Mode`], behavior [`Options`], and optional log / invalid-token
//! callbacks. It opens one TLS connection at a time, to either the delivery
//! gateway (port 2195) or the feedback endpoint (port 2196), and drives the
//! legacy write-and-pray delivery contract: notifications are streamed in
//! token-list order while the read side is watched for the gateway's
//! asynchronous 6-byte error response, and after a recoverable failure the
//! batch resumes right after the failed index on a fresh connection.
//!
//! ## Example
//!
//! ```rust,no_run
//! use apns_client::{Client, LogLevel, Mode, Options};
//! use apns_wire::Payload;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::new();
//! client.set_certificate("apns-cert.pem", "apns-key.pem", None);
//! client.set_mode(Mode::Sandbox);
//! client.set_behavior(Options::RECONNECT_ON_ERROR);
//! client.set_log_level(LogLevel::ERROR | LogLevel::INFO);
//!
//! let mut payload = Payload::new();
//! payload.set_alert("Hello");
//! payload.set_badge(1);
//!
//! let tokens = vec!["0".repeat(64)];
//!
//! client.connect().await?;
//! let invalid = client.send(&payload, &tokens).await?;
//! client.close().await;
//!
//! for token in invalid {
//!     eprintln!("rejected token: {token}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod logging;
mod transport;

pub use client::{Client, InvalidTokenCallback, Options};
pub use credentials::Credentials;
pub use error::{error_string, ApnsError, SendError};
pub use gateway::{
    Endpoint, Mode, PRODUCTION_FEEDBACK, PRODUCTION_GATEWAY, SANDBOX_FEEDBACK, SANDBOX_GATEWAY,
};
pub use logging::{LogCallback, LogLevel};

use std::sync::Once;

static LIBRARY_INIT: Once = Once::new();

/// Perform process-wide initialization.
///
/// Installs the TLS cryptography provider. Idempotent; called automatically
/// by [`Client::new`], so an explicit call is only needed when building TLS
/// state before the first client.
pub fn library_init() {
    LIBRARY_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

const fn decimal(digits: &str) -> u32 {
    let bytes = digits.as_bytes();
    let mut value = 0u32;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

/// Numeric library version, encoded as `(major << 16) | (minor << 8) | patch`
pub const fn version() -> u32 {
    (decimal(env!("CARGO_PKG_VERSION_MAJOR")) << 16)
        | (decimal(env!("CARGO_PKG_VERSION_MINOR")) << 8)
        | decimal(env!("CARGO_PKG_VERSION_PATCH"))
}

/// Library version string
pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
