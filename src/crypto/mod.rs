//! Cryptography Module
//!
//! Authenticated symmetric encryption for persisted documents, with
//! password-derived keys, a frozen legacy default key, and bounded-retry
//! password authentication.

pub mod authenticator;
pub mod provider;

pub use authenticator::{AuthState, PasswordAuthenticator};
pub use provider::{
    CipherBlob, CryptoError, CryptoProvider, Protection, LEGACY_PASSPHRASE, PROTECTED_SENTINEL,
    UNPROTECTED_SENTINEL,
};
