//! Encrypted structured-document codec.
//!
//! The document is never encrypted wholesale: a clear JSON envelope carries
//! the schema version, cipher/KDF identifiers, the KDF iteration count and
//! the sealed protection sentinel, so a reader can pick the correct key
//! before attempting to decrypt the body. The body is the plain-document
//! serialization of the tree, encrypted and base64-encoded.

use serde_json::{json, Value};

use crate::crypto::{
    CipherBlob, CryptoProvider, Protection, LEGACY_PASSPHRASE,
};
use crate::migrate::{SchemaVersion, CURRENT_SCHEMA_VERSION};
use crate::tree::RecordTree;

use super::document::DocumentCodec;
use super::filter::SaveFilter;
use super::{FormatError, TreeCodec};

const ENGINE: &str = "ChaCha20-Poly1305";
const KDF: &str = "Argon2id";

pub struct EncryptedDocumentCodec {
    provider: CryptoProvider,
    password: Option<String>,
}

impl EncryptedDocumentCodec {
    /// Codec protected only by the legacy default key. Documents written
    /// this way carry the "ThisIsNotProtected" sentinel.
    pub fn new(provider: CryptoProvider) -> Self {
        Self {
            provider,
            password: None,
        }
    }

    /// Codec protected by a user-chosen password ("ThisIsProtected").
    pub fn with_password(provider: CryptoProvider, password: impl Into<String>) -> Self {
        Self {
            provider,
            password: Some(password.into()),
        }
    }

    fn active_key(&self) -> &str {
        self.password.as_deref().unwrap_or(LEGACY_PASSPHRASE)
    }

    fn protection(&self) -> Protection {
        if self.password.is_some() {
            Protection::UserPassword
        } else {
            Protection::LegacyDefault
        }
    }

    /// Extract the sealed sentinel from an envelope without decrypting
    /// anything. This is the known ciphertext a `PasswordAuthenticator`
    /// retries candidate passwords against.
    pub fn protected_blob(input: &str) -> Result<CipherBlob, FormatError> {
        let doc: Value = serde_json::from_str(input)?;
        let encoded = doc
            .get("Protected")
            .and_then(Value::as_str)
            .ok_or(FormatError::MissingField("Protected"))?;
        Ok(CipherBlob::from_base64(encoded)?)
    }

    /// Probe which key protects an envelope: if the legacy default key
    /// opens the sentinel, the document needs no user password.
    pub fn probe_protection(
        input: &str,
        provider: &CryptoProvider,
    ) -> Result<Protection, FormatError> {
        let blob = Self::protected_blob(input)?;
        match provider.open_sentinel(&blob, LEGACY_PASSPHRASE) {
            Ok(protection) => Ok(protection),
            Err(crate::crypto::CryptoError::DecryptionFailed) => Ok(Protection::UserPassword),
            Err(e) => Err(e.into()),
        }
    }
}

impl TreeCodec for EncryptedDocumentCodec {
    fn version(&self) -> SchemaVersion {
        CURRENT_SCHEMA_VERSION
    }

    fn serialize(&self, tree: &RecordTree, filter: &SaveFilter) -> Result<String, FormatError> {
        let body_plain = DocumentCodec::new().serialize(tree, filter)?;
        let key = self.active_key();

        let protected = self.provider.seal_sentinel(self.protection(), key)?;
        let body = self.provider.encrypt(body_plain.as_bytes(), key)?;

        let envelope = json!({
            "SchemaVersion": self.version().to_string(),
            "EncryptionEngine": ENGINE,
            "Kdf": KDF,
            "KdfIterations": self.provider.kdf_iterations(),
            "Protected": protected.to_base64(),
            "Body": body.to_base64(),
        });
        Ok(serde_json::to_string_pretty(&envelope)?)
    }

    fn deserialize(&self, input: &str) -> Result<RecordTree, FormatError> {
        let doc: Value = serde_json::from_str(input)?;

        let declared: SchemaVersion = doc
            .get("SchemaVersion")
            .and_then(Value::as_str)
            .ok_or(FormatError::MissingField("SchemaVersion"))?
            .parse()?;
        if declared > CURRENT_SCHEMA_VERSION {
            return Err(FormatError::UnsupportedVersion(declared));
        }

        let engine = doc.get("EncryptionEngine").and_then(Value::as_str);
        if engine != Some(ENGINE) {
            return Err(FormatError::Malformed(format!(
                "unsupported encryption engine: {}",
                engine.unwrap_or("<missing>")
            )));
        }

        let key = self.active_key();

        // The sentinel authenticates the key before the body is touched.
        let protected = doc
            .get("Protected")
            .and_then(Value::as_str)
            .ok_or(FormatError::MissingField("Protected"))?;
        self.provider
            .open_sentinel(&CipherBlob::from_base64(protected)?, key)?;

        let body = doc
            .get("Body")
            .and_then(Value::as_str)
            .ok_or(FormatError::MissingField("Body"))?;
        let body_plain = self
            .provider
            .decrypt(&CipherBlob::from_base64(body)?, key)?;
        let body_text = String::from_utf8(body_plain)
            .map_err(|_| FormatError::Malformed("decrypted body is not UTF-8".to_string()))?;

        DocumentCodec::new().deserialize(&body_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoError;
    use crate::tree::ConnectionProperties;

    fn sample_tree() -> RecordTree {
        let mut tree = RecordTree::new();
        let root = tree.add_root("Connections");
        tree.add_connection(
            &root,
            "jump-01",
            ConnectionProperties::new("jump-01.example").with_password("pw"),
        )
        .unwrap();
        tree
    }

    fn provider() -> CryptoProvider {
        CryptoProvider::with_iterations(1)
    }

    #[test]
    fn test_roundtrip_with_user_password() {
        let codec = EncryptedDocumentCodec::with_password(provider(), "master-pw");
        let tree = sample_tree();
        let text = codec.serialize(&tree, &SaveFilter::default()).unwrap();

        // Metadata is readable without the key; secrets are not.
        assert!(text.contains("ChaCha20-Poly1305"));
        assert!(text.contains("Argon2id"));
        assert!(!text.contains("jump-01.example"));
        assert!(!text.contains("\"pw\""));

        let loaded = codec.deserialize(&text).unwrap();
        assert_eq!(loaded.len(), tree.len());
        let root = &loaded.roots()[0];
        assert_eq!(loaded.children(&root.id)[0].properties.hostname, "jump-01.example");
    }

    #[test]
    fn test_wrong_password_fails_decryption() {
        let writer = EncryptedDocumentCodec::with_password(provider(), "A");
        let text = writer.serialize(&sample_tree(), &SaveFilter::default()).unwrap();

        let reader = EncryptedDocumentCodec::with_password(provider(), "B");
        assert!(matches!(
            reader.deserialize(&text),
            Err(FormatError::Crypto(CryptoError::DecryptionFailed))
        ));

        let retry = EncryptedDocumentCodec::with_password(provider(), "A");
        assert!(retry.deserialize(&text).is_ok());
    }

    #[test]
    fn test_legacy_key_sentinel() {
        let codec = EncryptedDocumentCodec::new(provider());
        let text = codec.serialize(&sample_tree(), &SaveFilter::default()).unwrap();

        assert_eq!(
            EncryptedDocumentCodec::probe_protection(&text, &provider()).unwrap(),
            Protection::LegacyDefault
        );
        assert!(codec.deserialize(&text).is_ok());

        let protected = EncryptedDocumentCodec::with_password(provider(), "pw");
        let text = protected.serialize(&sample_tree(), &SaveFilter::default()).unwrap();
        assert_eq!(
            EncryptedDocumentCodec::probe_protection(&text, &provider()).unwrap(),
            Protection::UserPassword
        );
    }

    #[test]
    fn test_authenticator_against_envelope() {
        let prov = provider();
        let codec = EncryptedDocumentCodec::with_password(prov.clone(), "master-pw");
        let text = codec.serialize(&sample_tree(), &SaveFilter::default()).unwrap();

        let blob = EncryptedDocumentCodec::protected_blob(&text).unwrap();
        let mut auth = crate::crypto::PasswordAuthenticator::new(&prov, blob);
        assert!(auth.authenticate("wrong", || Some("master-pw".to_string())));
        assert_eq!(auth.last_authenticated_password(), Some("master-pw"));
    }

    #[test]
    fn test_tampered_body_detected() {
        let codec = EncryptedDocumentCodec::new(provider());
        let text = codec.serialize(&sample_tree(), &SaveFilter::default()).unwrap();

        let mut doc: Value = serde_json::from_str(&text).unwrap();
        let body = doc["Body"].as_str().unwrap().to_string();
        let mut blob = CipherBlob::from_base64(&body).unwrap();
        blob.ciphertext[0] ^= 0xFF;
        doc["Body"] = Value::from(blob.to_base64());

        let result = codec.deserialize(&doc.to_string());
        assert!(matches!(
            result,
            Err(FormatError::Crypto(CryptoError::DecryptionFailed))
        ));
    }
}
