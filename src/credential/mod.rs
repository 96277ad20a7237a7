//! Credential Repository Module
//!
//! Moves secret fields out of tree nodes into a separate, append-only
//! repository; nodes keep an opaque reference key instead.

pub mod harvest;

pub use harvest::harvest;

use uuid::Uuid;
use zeroize::Zeroize;

/// A username/password/domain triple owned by the repository.
///
/// Referenced from tree nodes by the `id` string, never by pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    pub id: String,
    pub title: String,
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl CredentialRecord {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        let username = username.into();
        let domain = domain.into();
        Self {
            id: Uuid::new_v4().to_string(),
            title: format!("{}\\{}", username, domain),
            username,
            password: password.into(),
            domain,
        }
    }
}

impl Drop for CredentialRecord {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Ordered collection of credential records, append-only from the
/// perspective of this subsystem.
#[derive(Debug, Default)]
pub struct CredentialRepository {
    records: Vec<CredentialRecord>,
}

impl CredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: CredentialRecord) -> String {
        let id = record.id.clone();
        self.records.push(record);
        id
    }

    pub fn get(&self, id: &str) -> Option<&CredentialRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CredentialRecord> {
        self.records.iter()
    }
}
