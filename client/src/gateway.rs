//! Static table of Apple gateway and feedback endpoints.

/// One Apple endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname
    pub host: &'static str,
    /// TCP port
    pub port: u16,
}

/// Sandbox delivery gateway
pub const SANDBOX_GATEWAY: Endpoint = Endpoint {
    host: "gateway.sandbox.push.apple.com",
    port: 2195,
};

/// Production delivery gateway
pub const PRODUCTION_GATEWAY: Endpoint = Endpoint {
    host: "gateway.push.apple.com",
    port: 2195,
};

/// Sandbox feedback endpoint
pub const SANDBOX_FEEDBACK: Endpoint = Endpoint {
    host: "feedback.sandbox.push.apple.com",
    port: 2196,
};

/// Production feedback endpoint
pub const PRODUCTION_FEEDBACK: Endpoint = Endpoint {
    host: "feedback.push.apple.com",
    port: 2196,
};

/// Which pair of Apple endpoints a client talks to.
///
/// Sandbox and production are independently certified; a certificate issued
/// for one is rejected by the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Production endpoints
    #[default]
    Production,
    /// Development sandbox endpoints
    Sandbox,
}

impl Mode {
    /// Delivery gateway for this mode
    pub fn gateway(self) -> Endpoint {
        match self {
            Mode::Sandbox => SANDBOX_GATEWAY,
            Mode::Production => PRODUCTION_GATEWAY,
        }
    }

    /// Feedback endpoint for this mode
    pub fn feedback(self) -> Endpoint {
        match self {
            Mode::Sandbox => SANDBOX_FEEDBACK,
            Mode::Production => PRODUCTION_FEEDBACK,
        }
    }
}
