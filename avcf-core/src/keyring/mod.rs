//! Keyring backends.
//!
//! The engine never touches key material itself; every cryptographic key
//! operation goes through a [`KeyringBackend`]. The production backend
//! ([`GpgKeyring`]) shells out to GnuPG; [`MemoryKeyring`] is a
//! deterministic stand-in for tests.

mod gpg;
mod memory;

pub use gpg::GpgKeyring;
pub use memory::MemoryKeyring;

use crate::error::Result;

/// Shortest key identifier accepted when resolving a signing key
/// (an OpenPGP short key id is eight hex digits).
pub const MIN_KEY_ID_DIGITS: usize = 8;

/// One key known to a keyring: short identifier plus canonical fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub key_id: String,
    pub fingerprint: String,
}

impl KeyEntry {
    /// Whether `query` identifies this key.
    ///
    /// Accepts the full fingerprint, the key id, or an exact hex suffix of
    /// the fingerprint of at least [`MIN_KEY_ID_DIGITS`] digits. Arbitrary
    /// substring containment is deliberately not accepted.
    pub fn matches(&self, query: &str) -> bool {
        query_matches_fingerprint(query, &self.fingerprint)
            || normalize_fingerprint(query) == normalize_fingerprint(&self.key_id)
    }
}

/// Uppercase a fingerprint and strip the conventional display spacing.
pub fn normalize_fingerprint(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Whether `query` identifies the key with `fingerprint`: the full
/// fingerprint, or an exact hex suffix of at least [`MIN_KEY_ID_DIGITS`]
/// digits (the OpenPGP short/long key-id convention).
pub fn query_matches_fingerprint(query: &str, fingerprint: &str) -> bool {
    let query = normalize_fingerprint(query);
    if query.len() < MIN_KEY_ID_DIGITS {
        return false;
    }
    normalize_fingerprint(fingerprint).ends_with(&query)
}

/// Contract for the external OpenPGP keyring backend.
pub trait KeyringBackend {
    /// List known public keys as key-id + fingerprint pairs.
    fn list_keys(&self) -> Result<Vec<KeyEntry>>;

    /// Export a public key by fingerprint as armored text.
    fn export_public_key(&self, fingerprint: &str) -> Result<String>;

    /// Produce a detached armored signature over `data` with the key
    /// identified by `key_id`.
    fn sign_detached(&self, data: &[u8], key_id: &str, passphrase: Option<&str>)
        -> Result<String>;

    /// Check a detached signature against `data`.
    ///
    /// `Ok(false)` means the signature does not check out; `Err` means the
    /// backend itself failed.
    fn verify_detached(&self, signature: &str, data: &[u8]) -> Result<bool>;

    /// Import armored key text, returning the fingerprints that resulted.
    fn import_key(&self, armored: &str) -> Result<Vec<String>>;
}

// A shared reference to a backend is itself a backend, so several services
// can operate over one keyring.
impl<K: KeyringBackend + ?Sized> KeyringBackend for &K {
    fn list_keys(&self) -> Result<Vec<KeyEntry>> {
        (**self).list_keys()
    }

    fn export_public_key(&self, fingerprint: &str) -> Result<String> {
        (**self).export_public_key(fingerprint)
    }

    fn sign_detached(
        &self,
        data: &[u8],
        key_id: &str,
        passphrase: Option<&str>,
    ) -> Result<String> {
        (**self).sign_detached(data, key_id, passphrase)
    }

    fn verify_detached(&self, signature: &str, data: &[u8]) -> Result<bool> {
        (**self).verify_detached(signature, data)
    }

    fn import_key(&self, armored: &str) -> Result<Vec<String>> {
        (**self).import_key(armored)
    }
}
