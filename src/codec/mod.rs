//! Codec Set Module
//!
//! One serializer/deserializer pair per external format. The text codecs
//! (plain document, encrypted document, delimited table) share the
//! `TreeCodec` contract; the relational store exposes the same-shaped API
//! behind a database connection, and the single-record export codec hands
//! one connection to an external consumer.

pub mod document;
pub mod encrypted;
pub mod export;
pub mod filter;
pub mod sql;
pub mod table;

pub use document::DocumentCodec;
pub use encrypted::EncryptedDocumentCodec;
pub use export::RdpExportCodec;
pub use filter::{SaveFilter, SensitiveField};
pub use sql::SqlStore;
pub use table::TableCodec;

use crate::crypto::CryptoError;
use crate::migrate::{ParseVersionError, SchemaVersion, UpgradeError};
use crate::tree::{RecordTree, TreeError};

/// Unparseable or unsupported input. Fatal to the single load that hit it;
/// other loads are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Schema version {0} is newer than supported")]
    UnsupportedVersion(SchemaVersion),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Invalid schema version: {0}")]
    Version(#[from] ParseVersionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Shared contract of the text codecs.
///
/// Containers serialize their full subtree. On read, unknown or missing
/// optional fields default rather than fail; missing identifying fields and
/// unrecognized future versions fail loudly.
pub trait TreeCodec {
    /// The schema version this codec writes.
    fn version(&self) -> SchemaVersion;

    fn serialize(&self, tree: &RecordTree, filter: &SaveFilter) -> Result<String, FormatError>;

    fn deserialize(&self, input: &str) -> Result<RecordTree, FormatError>;
}
