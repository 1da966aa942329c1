//! Device token conversion between hex and binary representations.

use std::fmt;

use crate::WireError;

/// Binary device token size in bytes
pub const TOKEN_BINARY_SIZE: usize = 32;

/// Hex device token length in characters
pub const TOKEN_HEX_LENGTH: usize = 64;

/// A 32-byte binary device token.
///
/// Tokens are conventionally transported as 64 hex characters; the gateway
/// expects the decoded binary form inside the notification frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceToken([u8; TOKEN_BINARY_SIZE]);

impl DeviceToken {
    /// Decode a token from its 64-character hex representation
    pub fn from_hex(token: &str) -> Result<Self, WireError> {
        if token.len() != TOKEN_HEX_LENGTH {
            return Err(WireError::TokenLength(token.len()));
        }
        let mut bytes = [0u8; TOKEN_BINARY_SIZE];
        hex::decode_to_slice(token, &mut bytes).map_err(|_| WireError::TokenHex)?;
        Ok(Self(bytes))
    }

    /// Encode the token as 64 lowercase hex characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw token bytes
    pub fn as_bytes(&self) -> &[u8; TOKEN_BINARY_SIZE] {
        &self.0
    }
}

impl From<[u8; TOKEN_BINARY_SIZE]> for DeviceToken {
    fn from(bytes: [u8; TOKEN_BINARY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceToken({})", self.to_hex())
    }
}

impl fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let hex_token = "a".repeat(TOKEN_HEX_LENGTH);
        let token = DeviceToken::from_hex(&hex_token).unwrap();
        assert_eq!(token.to_hex(), hex_token);
        assert_eq!(token.as_bytes(), &[0xaa; TOKEN_BINARY_SIZE]);
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(matches!(
            DeviceToken::from_hex("abcd"),
            Err(WireError::TokenLength(4))
        ));
    }

    #[test]
    fn test_rejects_non_hex() {
        let bad = "z".repeat(TOKEN_HEX_LENGTH);
        assert!(matches!(
            DeviceToken::from_hex(&bad),
            Err(WireError::TokenHex)
        ));
    }

    #[test]
    fn test_uppercase_accepted() {
        let upper = "AB".repeat(32);
        let token = DeviceToken::from_hex(&upper).unwrap();
        assert_eq!(token.to_hex(), "ab".repeat(32));
    }
}
