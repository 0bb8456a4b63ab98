use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// QR lifecycle events that webhooks can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrEvent {
    /// The QR code was scanned.
    Scan,
    /// The QR code passed its expiration date.
    Expire,
    /// The configured scan limit was reached.
    LimitReached,
    /// Someone entered a password for a protected QR code.
    PasswordAttempt,
    /// A scan triggered a geofence / location check.
    LocationCheck,
}

impl QrEvent {
    /// Stable string form used on the wire and in stored records.
    pub fn as_str(&self) -> &'static str {
        match self {
            QrEvent::Scan => "scan",
            QrEvent::Expire => "expire",
            QrEvent::LimitReached => "limit_reached",
            QrEvent::PasswordAttempt => "password_attempt",
            QrEvent::LocationCheck => "location_check",
        }
    }

    /// All known events, in a fixed order.
    pub fn all() -> [QrEvent; 5] {
        [
            QrEvent::Scan,
            QrEvent::Expire,
            QrEvent::LimitReached,
            QrEvent::PasswordAttempt,
            QrEvent::LocationCheck,
        ]
    }
}

impl std::fmt::Display for QrEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QrEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan" => Ok(QrEvent::Scan),
            "expire" => Ok(QrEvent::Expire),
            "limit_reached" => Ok(QrEvent::LimitReached),
            "password_attempt" => Ok(QrEvent::PasswordAttempt),
            "location_check" => Ok(QrEvent::LocationCheck),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognised event name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown QR event: {0}")]
pub struct UnknownEvent(pub String);
