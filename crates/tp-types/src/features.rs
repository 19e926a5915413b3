//! # Feature Negotiation
//!
//! A processor advertises the highest protocol feature it understands when
//! it registers. The validator acknowledges the level it supports, and the
//! processor never relies on anything above the acknowledged level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol capability levels, ordered from least to most capable.
///
/// Bump only when `TpRegisterRequest` gains a field the validator must
/// understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum FeatureVersion {
    /// No optional features.
    FeatureUnused = 0,
    /// The processor may choose how request headers are encoded.
    FeatureCustomHeaderStyle = 1,
}

impl FeatureVersion {
    /// Highest level this crate supports.
    pub const SDK_PROTOCOL_VERSION: Self = Self::FeatureCustomHeaderStyle;

    /// Wire value for this level.
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::FeatureUnused => 0,
            Self::FeatureCustomHeaderStyle => 1,
        }
    }

    /// Map an acknowledged wire value to a level.
    ///
    /// Values above the highest known level clamp to it; a peer cannot
    /// grant features this side does not implement.
    pub const fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::FeatureUnused,
            _ => Self::FeatureCustomHeaderStyle,
        }
    }
}

impl Default for FeatureVersion {
    fn default() -> Self {
        Self::SDK_PROTOCOL_VERSION
    }
}

/// How the header of each `TpProcessRequest` is encoded on this connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeaderStyle {
    /// The validator sends a decoded `TransactionHeader`.
    #[default]
    Expanded,
    /// The validator sends the serialized header bytes untouched.
    Raw,
}

impl HeaderStyle {
    /// Lowest feature level that makes this style available.
    pub const fn required_feature(self) -> FeatureVersion {
        match self {
            Self::Expanded => FeatureVersion::FeatureUnused,
            Self::Raw => FeatureVersion::FeatureCustomHeaderStyle,
        }
    }

    /// The style actually in effect once the validator acknowledged
    /// `acknowledged`. Falls back to `Expanded` when the requested style
    /// needs a feature the validator did not grant.
    pub fn negotiate(self, acknowledged: FeatureVersion) -> Self {
        if self.required_feature() <= acknowledged {
            self
        } else {
            Self::Expanded
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expanded => "expanded",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for HeaderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown header style name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown header style '{0}' (expected 'expanded' or 'raw')")]
pub struct ParseHeaderStyleError(pub String);

impl FromStr for HeaderStyle {
    type Err = ParseHeaderStyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "expanded" => Ok(Self::Expanded),
            "raw" => Ok(Self::Raw),
            _ => Err(ParseHeaderStyleError(s.to_string())),
        }
    }
}
