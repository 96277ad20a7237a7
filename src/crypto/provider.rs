//! Password-based authenticated encryption of document payloads.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit, Nonce};
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Argon2id cost parameters. The time cost (iterations) is configurable and
/// persisted inside every blob; memory cost and lane count are fixed for
/// the format.
const MEMORY_COST_KIB: u32 = 65536; // 64 MB
const PARALLELISM: u32 = 4;

/// Default Argon2id time cost for newly written blobs.
pub const DEFAULT_KDF_ITERATIONS: u32 = 3;

/// The fixed, publicly known passphrase used when no user password has ever
/// been set.
///
/// BACKWARD COMPATIBILITY: every document written without a user password
/// depends on this value; changing it would strand those documents unless a
/// migration path is implemented. The sentinel strings below distinguish
/// the two protection modes in persisted output and are equally frozen.
pub const LEGACY_PASSPHRASE: &str = "mR3m";

/// Sentinel written when a user-chosen password protects the document.
pub const PROTECTED_SENTINEL: &str = "ThisIsProtected";

/// Sentinel written when only the legacy default key protects the document.
pub const UNPROTECTED_SENTINEL: &str = "ThisIsNotProtected";

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Decryption failed (wrong password or corrupted data)")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("Malformed cipher blob: {0}")]
    MalformedBlob(String),

    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Which key protects a persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    UserPassword,
    LegacyDefault,
}

impl Protection {
    pub fn sentinel(&self) -> &'static str {
        match self {
            Protection::UserPassword => PROTECTED_SENTINEL,
            Protection::LegacyDefault => UNPROTECTED_SENTINEL,
        }
    }

    /// Constant-time match of decrypted sentinel bytes.
    pub fn from_sentinel(plaintext: &[u8]) -> Option<Self> {
        if plaintext.ct_eq(PROTECTED_SENTINEL.as_bytes()).into() {
            Some(Protection::UserPassword)
        } else if plaintext.ct_eq(UNPROTECTED_SENTINEL.as_bytes()).into() {
            Some(Protection::LegacyDefault)
        } else {
            None
        }
    }
}

/// A self-describing ciphertext: the KDF time cost travels with the salt,
/// nonce and AEAD output so any reader can re-derive the writer's key.
///
/// Layout: iterations (LE u32) | salt | nonce | ciphertext+tag.
#[derive(Debug, Clone, PartialEq)]
pub struct CipherBlob {
    pub kdf_iterations: u32,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl CipherBlob {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + SALT_LEN + NONCE_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.kdf_iterations.to_le_bytes());
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CryptoError> {
        // The ciphertext must at least carry the AEAD tag.
        if data.len() < 4 + SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(CryptoError::MalformedBlob("blob too short".to_string()));
        }
        let kdf_iterations = u32::from_le_bytes(data[0..4].try_into().expect("sized slice"));
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[4..4 + SALT_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[4 + SALT_LEN..4 + SALT_LEN + NONCE_LEN]);
        let ciphertext = data[4 + SALT_LEN + NONCE_LEN..].to_vec();
        Ok(Self {
            kdf_iterations,
            salt,
            nonce,
            ciphertext,
        })
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(&BASE64.decode(encoded.trim())?)
    }
}

/// Derive a 32-byte key from a password with Argon2id.
fn derive_key(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let params = Params::new(MEMORY_COST_KIB, iterations.max(1), PARALLELISM, Some(32))
        .map_err(|_| CryptoError::KeyDerivation)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut *key)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

/// Symmetric encrypt/decrypt of serialized payloads.
///
/// Tampering and wrong passwords both surface as `DecryptionFailed`; the
/// AEAD tag never lets garbage through silently.
#[derive(Debug, Clone)]
pub struct CryptoProvider {
    kdf_iterations: u32,
}

impl Default for CryptoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider {
    pub fn new() -> Self {
        Self {
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
        }
    }

    /// Override the Argon2id time cost for newly written blobs. Decryption
    /// always honors the cost recorded in the blob being read.
    pub fn with_iterations(kdf_iterations: u32) -> Self {
        Self {
            kdf_iterations: kdf_iterations.max(1),
        }
    }

    pub fn kdf_iterations(&self) -> u32 {
        self.kdf_iterations
    }

    pub fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<CipherBlob, CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let key = derive_key(password, &salt, self.kdf_iterations)?;
        let cipher = ChaCha20Poly1305::new_from_slice(&*key)
            .map_err(|_| CryptoError::KeyDerivation)?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(CipherBlob {
            kdf_iterations: self.kdf_iterations,
            salt,
            nonce,
            ciphertext,
        })
    }

    pub fn decrypt(&self, blob: &CipherBlob, password: &str) -> Result<Vec<u8>, CryptoError> {
        let key = derive_key(password, &blob.salt, blob.kdf_iterations)?;
        let cipher = ChaCha20Poly1305::new_from_slice(&*key)
            .map_err(|_| CryptoError::KeyDerivation)?;

        cipher
            .decrypt(Nonce::from_slice(&blob.nonce), blob.ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Encrypt the sentinel for the given protection mode under `password`.
    /// The result doubles as the known ciphertext for the authenticator.
    pub fn seal_sentinel(
        &self,
        protection: Protection,
        password: &str,
    ) -> Result<CipherBlob, CryptoError> {
        self.encrypt(protection.sentinel().as_bytes(), password)
    }

    /// Decrypt a sealed sentinel and report which protection mode it
    /// declares. Wrong passwords fail decryption; a decryptable blob that
    /// carries neither sentinel is treated as corrupted.
    pub fn open_sentinel(
        &self,
        blob: &CipherBlob,
        password: &str,
    ) -> Result<Protection, CryptoError> {
        let plaintext = self.decrypt(blob, password)?;
        Protection::from_sentinel(&plaintext)
            .ok_or_else(|| CryptoError::MalformedBlob("unknown sentinel".to_string()))
    }
}
