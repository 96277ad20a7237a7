//! Bounded-retry password authentication against a known ciphertext.

use zeroize::Zeroizing;

use super::provider::{CipherBlob, CryptoProvider};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    AwaitingPassword,
    Authenticated,
    Failed,
}

/// Tries candidate passwords against a known ciphertext (typically the
/// sealed sentinel of a persisted document), re-prompting the caller after
/// each failure up to a configurable attempt limit.
///
/// The whole `authenticate` call blocks for the duration of the re-prompt
/// callback; callers needing non-blocking behavior run it off their primary
/// execution context.
pub struct PasswordAuthenticator<'a> {
    provider: &'a CryptoProvider,
    known_cipher: CipherBlob,
    max_attempts: u32,
    state: AuthState,
    last_password: Option<Zeroizing<String>>,
}

impl<'a> PasswordAuthenticator<'a> {
    pub fn new(provider: &'a CryptoProvider, known_cipher: CipherBlob) -> Self {
        Self {
            provider,
            known_cipher,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            state: AuthState::AwaitingPassword,
            last_password: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// The password that last decrypted the known ciphertext, for reuse by
    /// the caller (e.g. to decrypt the document body without re-prompting).
    pub fn last_authenticated_password(&self) -> Option<&str> {
        self.last_password.as_deref().map(String::as_str)
    }

    /// Attempt authentication starting from `password`. After each failed
    /// attempt `reprompt` supplies the next candidate; returning `None` or
    /// an empty string aborts immediately.
    pub fn authenticate<F>(&mut self, password: &str, mut reprompt: F) -> bool
    where
        F: FnMut() -> Option<String>,
    {
        let mut candidate = Zeroizing::new(password.to_string());
        let mut attempts = 0;

        while attempts < self.max_attempts {
            match self.provider.decrypt(&self.known_cipher, &candidate) {
                Ok(_) => {
                    self.state = AuthState::Authenticated;
                    self.last_password = Some(candidate);
                    return true;
                }
                Err(_) => {
                    attempts += 1;
                    tracing::debug!(attempts, max = self.max_attempts, "Password attempt failed");
                    if attempts >= self.max_attempts {
                        break;
                    }
                    match reprompt() {
                        Some(next) if !next.is_empty() => candidate = Zeroizing::new(next),
                        _ => {
                            self.state = AuthState::Failed;
                            return false;
                        }
                    }
                }
            }
        }

        self.state = AuthState::Failed;
        false
    }
}
