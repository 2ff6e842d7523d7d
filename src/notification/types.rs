use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier the delivery service assigns to a displayed notification.
///
/// Always non-zero: zero is reserved on the wire for "no notification to replace".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(u32);

impl NotificationId {
    /// Wrap a server-assigned id, rejecting zero
    pub fn new(id: u32) -> Option<Self> {
        if id == 0 {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How long a notification stays visible before the service dismisses it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeout {
    /// Let the service pick its own default
    #[default]
    Default,
    /// Stay until closed by the user or the client
    Never,
    /// Dismiss after the given number of milliseconds (always >= 1)
    Millis(u32),
}

impl Timeout {
    /// Build a timeout from a millisecond count; zero means never expire.
    pub fn from_millis(ms: u32) -> Self {
        if ms == 0 {
            Timeout::Never
        } else {
            Timeout::Millis(ms)
        }
    }

    /// Interpret a signed config value: negative is the service default,
    /// zero never expires, anything larger is clamped into `i32` range.
    pub fn from_config(ms: i64) -> Self {
        if ms < 0 {
            Timeout::Default
        } else {
            Self::from_millis(ms.min(i32::MAX as i64) as u32)
        }
    }

    /// Value of the `expire_timeout` argument on the wire
    pub fn as_wire(self) -> i32 {
        match self {
            Timeout::Default => -1,
            Timeout::Never => 0,
            Timeout::Millis(ms) => ms.min(i32::MAX as u32) as i32,
        }
    }
}

/// Urgency levels understood by notification servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    Critical,
}

impl Urgency {
    /// Byte value of the `urgency` hint
    pub fn as_hint(self) -> u8 {
        match self {
            Urgency::Low => 0,
            Urgency::Normal => 1,
            Urgency::Critical => 2,
        }
    }
}

/// Why a notification went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Display timeout elapsed
    Expired,
    /// Dismissed by the user
    Dismissed,
    /// Closed through a close call
    Closed,
    /// Reason not reported or not recognized
    Undefined,
}

impl CloseReason {
    pub fn from_wire(reason: u32) -> Self {
        match reason {
            1 => CloseReason::Expired,
            2 => CloseReason::Dismissed,
            3 => CloseReason::Closed,
            _ => CloseReason::Undefined,
        }
    }
}

/// Identity of the notification server, as reported by `GetServerInformation`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInformation {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub spec_version: String,
}
