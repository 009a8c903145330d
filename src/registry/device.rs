//! Device model: one push-capable installation bound to a user.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Client platform, kept for bookkeeping only; delivery logic does not
/// branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Ios => write!(f, "ios"),
            Platform::Android => write!(f, "android"),
            Platform::Web => write!(f, "web"),
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            "web" => Ok(Platform::Web),
            other => Err(Error::Validation(format!("unknown platform: {other}"))),
        }
    }
}

/// A registered push-notification endpoint.
///
/// `push_token` is unique across the registry and is the natural key for
/// lookups; a device belongs to exactly one user at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Opaque unique identifier, assigned at creation, immutable.
    pub id: Uuid,

    /// Owning user identifier.
    pub user_id: String,

    /// Token issued by the push gateway.
    pub push_token: String,

    /// Client platform.
    pub platform: Platform,

    /// Refreshed on registration and on successful delivery bookkeeping.
    pub last_used_at: DateTime<Utc>,
}

impl Device {
    /// Create a fresh device row for a first-time registration.
    pub fn new(user_id: &str, push_token: &str, platform: Platform) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            push_token: push_token.to_string(),
            platform,
            last_used_at: Utc::now(),
        }
    }
}
