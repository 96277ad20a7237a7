//! HopVault - hierarchical configuration store for remote-connection profiles
//!
//! A tree of folders and leaf records where leaves may inherit individual
//! field values from an ancestor folder, persisted to and restored from
//! several interchangeable encodings: an encrypted structured document, a
//! plain structured document, a flat delimited table and a relational
//! store. Each format is independently versioned behind an upgrader chain,
//! and every serializer honors a save-filter policy for sensitive fields.
//!
//! The tree itself is plain data and not internally synchronized; the
//! embedding application serializes mutations onto one logical owner. Only
//! the change-detection watchers own background threads.

pub mod codec;
pub mod credential;
pub mod crypto;
pub mod migrate;
pub mod store;
pub mod tree;
pub mod watch;

pub use codec::{
    DocumentCodec, EncryptedDocumentCodec, FormatError, RdpExportCodec, SaveFilter,
    SensitiveField, SqlStore, TableCodec, TreeCodec,
};
pub use credential::{harvest, CredentialRecord, CredentialRepository};
pub use crypto::{AuthState, CryptoError, CryptoProvider, PasswordAuthenticator, Protection};
pub use migrate::{SchemaVersion, UpgradeError, CURRENT_SCHEMA_VERSION};
pub use store::{FileStore, StoreError};
pub use tree::{
    ConnectionProperties, InheritanceFlags, InheritedProperty, NodeKind, PropertyValue, Protocol,
    RecordNode, RecordTree, TreeError,
};
pub use watch::{FileUpdateChecker, SqlUpdateChecker, UpdateChecker, UpdateEvent, UpdateSource};
