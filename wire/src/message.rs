//! Enhanced binary notification frame.
//!
//! A frame is encoded once per batch from a [`Payload`] and reused for every
//! device: the notification identifier and the device token are the only
//! fields that change between sends, so their byte offsets are recorded at
//! build time and patched in place.

use bytes::{BufMut, BytesMut};

use crate::payload::{Payload, Priority};
use crate::token::{DeviceToken, TOKEN_BINARY_SIZE};
use crate::WireError;

/// Command byte of the enhanced notification frame
pub const NOTIFICATION_COMMAND: u8 = 2;

const ITEM_DEVICE_TOKEN: u8 = 1;
const ITEM_PAYLOAD: u8 = 2;
const ITEM_IDENTIFIER: u8 = 3;
const ITEM_EXPIRATION: u8 = 4;
const ITEM_PRIORITY: u8 = 5;

/// Item header: u8 item id + u16 item length
const ITEM_HEADER_SIZE: usize = 3;

/// A reusable notification frame.
///
/// The frame size and all bytes other than the notification identifier and
/// the device token are fixed after creation.
#[derive(Debug, Clone)]
pub struct BinaryMessage {
    buf: BytesMut,
    id_offset: usize,
    token_offset: usize,
}

impl BinaryMessage {
    /// Encode a payload into a notification frame.
    ///
    /// The identifier and token items are zeroed; callers patch them with
    /// [`BinaryMessage::set_id`] and [`BinaryMessage::set_token`] before each
    /// send.
    pub fn from_payload(payload: &Payload) -> Result<Self, WireError> {
        let json = payload.to_json()?;
        Ok(Self::build(
            json.as_bytes(),
            payload.expiry(),
            payload.priority(),
        ))
    }

    fn build(payload: &[u8], expiry: u32, priority: Priority) -> Self {
        let frame_len = ITEM_HEADER_SIZE * 5 + TOKEN_BINARY_SIZE + payload.len() + 4 + 4 + 1;
        let mut buf = BytesMut::with_capacity(5 + frame_len);

        buf.put_u8(NOTIFICATION_COMMAND);
        buf.put_u32(frame_len as u32);

        buf.put_u8(ITEM_DEVICE_TOKEN);
        buf.put_u16(TOKEN_BINARY_SIZE as u16);
        let token_offset = buf.len();
        buf.put_bytes(0, TOKEN_BINARY_SIZE);

        buf.put_u8(ITEM_PAYLOAD);
        buf.put_u16(payload.len() as u16);
        buf.put_slice(payload);

        buf.put_u8(ITEM_IDENTIFIER);
        buf.put_u16(4);
        let id_offset = buf.len();
        buf.put_u32(0);

        buf.put_u8(ITEM_EXPIRATION);
        buf.put_u16(4);
        buf.put_u32(expiry);

        buf.put_u8(ITEM_PRIORITY);
        buf.put_u16(1);
        buf.put_u8(priority as u8);

        Self {
            buf,
            id_offset,
            token_offset,
        }
    }

    /// Patch the notification identifier (big-endian on the wire)
    pub fn set_id(&mut self, id: u32) {
        self.buf[self.id_offset..self.id_offset + 4].copy_from_slice(&id.to_be_bytes());
    }

    /// Patch the device token
    pub fn set_token(&mut self, token: &DeviceToken) {
        self.buf[self.token_offset..self.token_offset + TOKEN_BINARY_SIZE]
            .copy_from_slice(token.as_bytes());
    }

    /// Decode a hex token and patch it into the frame
    pub fn set_token_hex(&mut self, token: &str) -> Result<(), WireError> {
        self.set_token(&DeviceToken::from_hex(token)?);
        Ok(())
    }

    /// Total frame size in bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the frame is empty (never true for a built frame)
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encoded frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
