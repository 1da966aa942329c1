//! Notification payload construction.
//!
//! The payload is the JSON document carried inside the notification frame.
//! It always contains an `aps` dictionary with the alert fields; custom
//! properties live next to it at the top level.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::WireError;

/// Maximum encoded payload size accepted by the legacy gateway (2 KiB)
pub const PAYLOAD_MAX_SIZE: usize = 2048;

/// Delivery priority carried in the notification frame
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    /// Immediate delivery
    High = 10,
    /// Power-conserving background delivery
    Low = 5,
}

/// Notification payload.
///
/// Collects the `aps` dictionary fields, top-level custom properties, and
/// the frame-level expiry and priority, then serializes them to JSON with
/// [`Payload::to_json`].
#[derive(Debug, Clone)]
pub struct Payload {
    alert: Option<String>,
    badge: Option<u32>,
    sound: Option<String>,
    category: Option<String>,
    content_available: bool,
    expiry: u32,
    priority: Priority,
    custom: Map<String, Value>,
}

impl Default for Payload {
    fn default() -> Self {
        Self {
            alert: None,
            badge: None,
            sound: None,
            category: None,
            content_available: false,
            expiry: 0,
            priority: Priority::High,
            custom: Map::new(),
        }
    }
}

impl Payload {
    /// Create an empty payload with default expiry (0) and high priority
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the alert message text
    pub fn set_alert(&mut self, alert: impl Into<String>) {
        self.alert = Some(alert.into());
    }

    /// Set the number to display as the badge on the application icon
    pub fn set_badge(&mut self, badge: u32) {
        self.badge = Some(badge);
    }

    /// Set the sound file name to play on arrival
    pub fn set_sound(&mut self, sound: impl Into<String>) {
        self.sound = Some(sound.into());
    }

    /// Set the notification category
    pub fn set_category(&mut self, category: impl Into<String>) {
        self.category = Some(category.into());
    }

    /// Mark the notification as a silent background update
    pub fn set_content_available(&mut self, available: bool) {
        self.content_available = available;
    }

    /// Set the expiration date (seconds since the epoch, 0 = do not store)
    pub fn set_expiry(&mut self, expiry: u32) {
        self.expiry = expiry;
    }

    /// Set the delivery priority
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Add a custom top-level property.
    ///
    /// The key must not collide with `aps` or a previously added property.
    pub fn set_custom(&mut self, key: impl Into<String>, value: Value) -> Result<(), WireError> {
        let key = key.into();
        if key == "aps" || self.custom.contains_key(&key) {
            return Err(WireError::CustomKey(key));
        }
        self.custom.insert(key, value);
        Ok(())
    }

    /// Expiration date carried in the notification frame
    pub fn expiry(&self) -> u32 {
        self.expiry
    }

    /// Delivery priority carried in the notification frame
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Serialize the payload to its JSON document.
    ///
    /// Requires either an alert text or the content-available flag, and
    /// enforces the legacy 2 KiB size limit.
    pub fn to_json(&self) -> Result<String, WireError> {
        if self.alert.is_none() && !self.content_available {
            return Err(WireError::AlertMissing);
        }

        let mut aps = Map::new();
        if let Some(alert) = &self.alert {
            aps.insert("alert".to_string(), Value::String(alert.clone()));
        }
        if let Some(badge) = self.badge {
            aps.insert("badge".to_string(), Value::from(badge));
        }
        if let Some(sound) = &self.sound {
            aps.insert("sound".to_string(), Value::String(sound.clone()));
        }
        if let Some(category) = &self.category {
            aps.insert("category".to_string(), Value::String(category.clone()));
        }
        if self.content_available {
            aps.insert("content-available".to_string(), Value::from(1));
        }

        let mut root = Map::new();
        root.insert("aps".to_string(), Value::Object(aps));
        for (key, value) in &self.custom {
            root.insert(key.clone(), value.clone());
        }

        let json = serde_json::to_string(&Value::Object(root))?;
        if json.len() > PAYLOAD_MAX_SIZE {
            return Err(WireError::PayloadSize(json.len()));
        }
        Ok(json)
    }
}
