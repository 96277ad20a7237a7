//! Schema Version & Upgrader Chains
//!
//! Every persisted format carries a `major.minor` version tag read at load
//! time. Older inputs pass through an ordered list of upgrade steps before
//! the tree is constructed; newer-than-current inputs are rejected rather
//! than guessed at.

pub mod document;
pub mod sql;

use std::fmt;
use std::str::FromStr;

/// Monotonically increasing `(major, minor)` pair stored once per persisted
/// document/connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u16,
    pub minor: u16,
}

impl SchemaVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

/// The schema version written by this build, shared by the document and
/// relational formats.
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 2);

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Invalid schema version: {0}")]
pub struct ParseVersionError(String);

impl FromStr for SchemaVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| ParseVersionError(s.to_string()))?;
        let major = major
            .parse()
            .map_err(|_| ParseVersionError(s.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| ParseVersionError(s.to_string()))?;
        Ok(Self { major, minor })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("Schema version {0} is newer than supported {CURRENT_SCHEMA_VERSION}")]
    UnsupportedVersion(SchemaVersion),

    #[error("Upgrade step to {target} failed: {reason}")]
    StepFailed {
        target: SchemaVersion,
        reason: String,
    },

    #[error("Database error during upgrade: {0}")]
    Sql(#[from] rusqlite::Error),
}
