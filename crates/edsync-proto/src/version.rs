//! Protocol versioning for the hello exchange.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol version for adapter-daemon communication.
///
/// Uses semantic versioning: major.minor
/// - Major version bump: breaking changes, incompatible
/// - Minor version bump: additive changes, backward compatible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Current protocol version.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parses a version string like "1.0".
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| VersionError::InvalidFormat(s.to_string()))?;
        let major = major
            .parse::<u16>()
            .map_err(|_| VersionError::InvalidFormat(s.to_string()))?;
        let minor = minor
            .parse::<u16>()
            .map_err(|_| VersionError::InvalidFormat(s.to_string()))?;
        Ok(Self { major, minor })
    }

    /// Returns true if this version is compatible with another.
    ///
    /// Major versions must match; any minor version within the same major
    /// version is compatible.
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Errors that can occur with version handling.
#[derive(Error, Debug, Clone)]
pub enum VersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),
}
