//! Shared value types for the membership and routing core.
//!
//! Persisted rows keep the historical `-` marker for "no template / no action /
//! no redirect"; everything above the repositories works with `Option` instead.

pub mod identity;

pub use identity::Identity;

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ROLE_ADMINISTRATOR: &str = "Administrator";
pub const ROLE_MEMBER: &str = "Member";

/// Pseudo-role held implicitly by every visitor, anonymous ones included.
pub const ROLE_ALL: &str = "All";

/// Persisted marker for an absent template, action or redirect.
pub const NONE_MARKER: &str = "-";

/// Reads a persisted column that may hold [`NONE_MARKER`].
#[must_use]
pub fn from_marker(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == NONE_MARKER {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[must_use]
pub fn to_marker(value: Option<&str>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(NONE_MARKER)
        .to_string()
}

/// Fixed-width UTC timestamp. Validity intervals are compared as strings, so
/// every stored instant must go through this.
#[must_use]
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[must_use]
pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// [`timestamp`] of `at` plus `days`.
pub fn timestamp_days_after(at: DateTime<Utc>, days: i64) -> anyhow::Result<String> {
    shifted(at, TimeDelta::try_days(days))
        .ok_or_else(|| anyhow::anyhow!("{days} days after {at} is out of range"))
}

/// [`timestamp`] of `at` minus `minutes`.
pub fn timestamp_minutes_before(at: DateTime<Utc>, minutes: i64) -> anyhow::Result<String> {
    shifted(at, TimeDelta::try_minutes(minutes).map(|delta| -delta))
        .ok_or_else(|| anyhow::anyhow!("{minutes} minutes before {at} is out of range"))
}

// Four-digit years only; anything else breaks string ordering.
fn shifted(at: DateTime<Utc>, delta: Option<TimeDelta>) -> Option<String> {
    delta
        .and_then(|delta| at.checked_add_signed(delta))
        .filter(|shifted| (0..=9999).contains(&shifted.year()))
        .map(timestamp)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestMethod {
    Get,
    Post,
    /// Matches every method. Persisted as `*`.
    Any,
}

impl RequestMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Any => "*",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "*" => Ok(Self::Any),
            other => Err(format!("Unsupported request method: {other}")),
        }
    }
}

/// Successful credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Ok,
    /// The active credential was issued by an administrator and must be
    /// replaced before anything else.
    TemporaryPassword,
}

impl ValidationOutcome {
    #[must_use]
    pub const fn is_temporary(self) -> bool {
        matches!(self, Self::TemporaryPassword)
    }
}
