//! In-memory keyring for tests.

use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use super::{normalize_fingerprint, query_matches_fingerprint, KeyEntry, KeyringBackend};
use crate::error::{AvcfError, Result};

const ARMOR_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
const ARMOR_FOOTER: &str = "-----END PGP PUBLIC KEY BLOCK-----";
const SIGNATURE_PREFIX: &str = "MEMSIG";

#[derive(Debug, Clone)]
struct MemoryKey {
    key_id: String,
    fingerprint: String,
    has_secret: bool,
    passphrase: Option<String>,
}

/// Deterministic in-memory keyring.
///
/// WARNING: not cryptography. Signatures are SHA-256 digests bound to a
/// fingerprint, just enough to exercise the engine's control flow in tests.
#[derive(Debug, Default)]
pub struct MemoryKeyring {
    entries: Mutex<Vec<MemoryKey>>,
}

impl MemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a fingerprint from a seed label and add the key pair.
    pub fn generate_key(&self, label: &str) -> String {
        self.insert_secret_key(label, None)
    }

    /// Like [`MemoryKeyring::generate_key`], but signing demands a
    /// passphrase.
    pub fn generate_protected_key(&self, label: &str, passphrase: &str) -> String {
        self.insert_secret_key(label, Some(passphrase.to_string()))
    }

    /// Drop a key entirely, as if the signer's keyring were elsewhere.
    pub fn remove_key(&self, fingerprint: &str) {
        let wanted = normalize_fingerprint(fingerprint);
        self.entries().retain(|key| key.fingerprint != wanted);
    }

    fn insert_secret_key(&self, label: &str, passphrase: Option<String>) -> String {
        let digest = Sha256::digest(label.as_bytes());
        let fingerprint = hex::encode_upper(&digest[..20]);
        let key_id = fingerprint[fingerprint.len() - 16..].to_string();
        self.entries().push(MemoryKey {
            key_id,
            fingerprint: fingerprint.clone(),
            has_secret: true,
            passphrase,
        });
        fingerprint
    }

    fn entries(&self) -> MutexGuard<'_, Vec<MemoryKey>> {
        self.entries.lock().expect("keyring lock poisoned")
    }

    fn armored_stanza(fingerprint: &str) -> String {
        format!("{ARMOR_HEADER}\nmem:{fingerprint}\n{ARMOR_FOOTER}\n")
    }

    fn digest_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }
}

impl KeyringBackend for MemoryKeyring {
    fn list_keys(&self) -> Result<Vec<KeyEntry>> {
        Ok(self
            .entries()
            .iter()
            .map(|key| KeyEntry {
                key_id: key.key_id.clone(),
                fingerprint: key.fingerprint.clone(),
            })
            .collect())
    }

    fn export_public_key(&self, fingerprint: &str) -> Result<String> {
        let wanted = normalize_fingerprint(fingerprint);
        self.entries()
            .iter()
            .find(|key| key.fingerprint == wanted)
            .map(|key| Self::armored_stanza(&key.fingerprint))
            .ok_or_else(|| AvcfError::Key(format!("no key with fingerprint {fingerprint}")))
    }

    fn sign_detached(
        &self,
        data: &[u8],
        key_id: &str,
        passphrase: Option<&str>,
    ) -> Result<String> {
        let entries = self.entries();
        let key = entries
            .iter()
            .find(|key| query_matches_fingerprint(key_id, &key.fingerprint))
            .ok_or_else(|| AvcfError::Crypto(format!("no key matching {key_id}")))?;

        if !key.has_secret {
            return Err(AvcfError::Crypto(format!(
                "key {} has no secret part",
                key.fingerprint
            )));
        }
        if let Some(required) = key.passphrase.as_deref() {
            if passphrase != Some(required) {
                return Err(AvcfError::Crypto(format!(
                    "bad passphrase for {}",
                    key.fingerprint
                )));
            }
        }

        Ok(format!(
            "{SIGNATURE_PREFIX}:{}:{}",
            key.fingerprint,
            Self::digest_hex(data)
        ))
    }

    fn verify_detached(&self, signature: &str, data: &[u8]) -> Result<bool> {
        let mut parts = signature.trim().splitn(3, ':');
        let (prefix, fingerprint, digest) = (parts.next(), parts.next(), parts.next());

        if prefix != Some(SIGNATURE_PREFIX) {
            return Err(AvcfError::Crypto(
                "unrecognized signature format".to_string(),
            ));
        }
        let fingerprint = fingerprint.unwrap_or_default();
        if !self
            .entries()
            .iter()
            .any(|key| key.fingerprint == fingerprint)
        {
            return Err(AvcfError::Crypto(format!(
                "no public key for {fingerprint}"
            )));
        }

        Ok(digest == Some(Self::digest_hex(data).as_str()))
    }

    fn import_key(&self, armored: &str) -> Result<Vec<String>> {
        let mut imported = Vec::new();
        for line in armored.lines() {
            if let Some(raw) = line.trim().strip_prefix("mem:") {
                let fingerprint = normalize_fingerprint(raw);
                if fingerprint.is_empty() {
                    continue;
                }
                let mut entries = self.entries();
                if !entries.iter().any(|key| key.fingerprint == fingerprint) {
                    let key_id = fingerprint[fingerprint.len().saturating_sub(16)..].to_string();
                    entries.push(MemoryKey {
                        key_id,
                        fingerprint: fingerprint.clone(),
                        has_secret: false,
                        passphrase: None,
                    });
                }
                imported.push(fingerprint);
            }
        }
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_list() {
        let keyring = MemoryKeyring::new();
        let fingerprint = keyring.generate_key("jane");

        let keys = keyring.list_keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].fingerprint, fingerprint);
        assert_eq!(keys[0].key_id.len(), 16);
        assert!(fingerprint.ends_with(&keys[0].key_id));
    }

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let keyring = MemoryKeyring::new();
        let fingerprint = keyring.generate_key("jane");

        let signature = keyring.sign_detached(b"payload", &fingerprint, None).unwrap();
        assert!(keyring.verify_detached(&signature, b"payload").unwrap());
        assert!(!keyring.verify_detached(&signature, b"tampered").unwrap());
    }

    #[test]
    fn test_sign_requires_passphrase_when_protected() {
        let keyring = MemoryKeyring::new();
        let fingerprint = keyring.generate_protected_key("jane", "hunter2");

        assert!(keyring.sign_detached(b"x", &fingerprint, None).is_err());
        assert!(keyring
            .sign_detached(b"x", &fingerprint, Some("wrong"))
            .is_err());
        assert!(keyring
            .sign_detached(b"x", &fingerprint, Some("hunter2"))
            .is_ok());
    }

    #[test]
    fn test_export_import_restores_public_key() {
        let signer = MemoryKeyring::new();
        let fingerprint = signer.generate_key("jane");
        let armored = signer.export_public_key(&fingerprint).unwrap();
        let signature = signer.sign_detached(b"payload", &fingerprint, None).unwrap();

        let verifier = MemoryKeyring::new();
        let imported = verifier.import_key(&armored).unwrap();
        assert_eq!(imported, vec![fingerprint.clone()]);

        // Public part only: verification works, signing does not.
        assert!(verifier.verify_detached(&signature, b"payload").unwrap());
        assert!(verifier.sign_detached(b"x", &fingerprint, None).is_err());
    }

    #[test]
    fn test_import_garbage_yields_no_fingerprints() {
        let keyring = MemoryKeyring::new();
        assert!(keyring.import_key("not a key at all").unwrap().is_empty());
    }

    #[test]
    fn test_verify_unknown_key_is_backend_error() {
        let keyring = MemoryKeyring::new();
        let err = keyring
            .verify_detached("MEMSIG:AAAA:bbbb", b"data")
            .unwrap_err();
        assert!(err.to_string().contains("no public key"));
    }
}
