//! Crypto engine: content hashing, metadata construction, signing and
//! signature verification.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{SubsecRound, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::error::{AvcfError, Result};
use crate::keyring::{normalize_fingerprint, GpgKeyring, KeyringBackend};
use crate::model::{AvcfMetadata, SignedAvcfBlock, VerificationResult};

/// Tool identity stamped into every metadata record, fixed per build.
pub const TOOL_NAME: &str = "avcf-sign";
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Read size for streamed hashing.
const HASH_CHUNK_SIZE: usize = 4096;

/// Optional metadata fields: one options value instead of a parameter list.
#[derive(Debug, Clone, Default)]
pub struct MetadataOptions {
    pub author_email: Option<String>,
    pub author_organization: Option<String>,
    pub pubkey_url: Option<String>,
    pub embedded_pubkey: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
}

/// Cryptographic operations over a keyring backend.
pub struct CryptoService<K: KeyringBackend = GpgKeyring> {
    keyring: K,
}

impl CryptoService<GpgKeyring> {
    /// Service over an ephemeral keyring home, removed again on drop.
    pub fn new() -> Result<Self> {
        Ok(Self {
            keyring: GpgKeyring::new()?,
        })
    }

    /// Service over an existing keyring home.
    pub fn with_home(path: impl Into<PathBuf>) -> Self {
        Self {
            keyring: GpgKeyring::with_home(path),
        }
    }
}

impl<K: KeyringBackend> CryptoService<K> {
    pub fn with_keyring(keyring: K) -> Self {
        Self { keyring }
    }

    pub fn keyring(&self) -> &K {
        &self.keyring
    }

    /// SHA-256 over the full file content, streamed in fixed-size chunks.
    #[instrument(level = "debug", skip(self))]
    pub fn hash_file(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path)
            .map_err(|e| AvcfError::Crypto(format!("failed to read {}: {e}", path.display())))?;

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; HASH_CHUNK_SIZE];
        loop {
            let read = file.read(&mut buffer).map_err(|e| {
                AvcfError::Crypto(format!("failed to read {}: {e}", path.display()))
            })?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Assemble a metadata record for `video_path`: hash the content, stamp
    /// the current UTC time (whole seconds, matching the canonical
    /// encoding) and the fixed tool identity.
    pub fn build_metadata(
        &self,
        video_path: &Path,
        author_name: &str,
        pubkey_fingerprint: &str,
        options: MetadataOptions,
    ) -> Result<AvcfMetadata> {
        validate_author_name(author_name)?;
        let fingerprint = validate_fingerprint(pubkey_fingerprint)?;
        if let Some(url) = options.pubkey_url.as_deref() {
            validate_pubkey_url(url)?;
        }

        let video_hash = self.hash_file(video_path)?;

        Ok(AvcfMetadata {
            video_hash,
            author_name: author_name.to_string(),
            author_email: options.author_email,
            author_organization: options.author_organization,
            pubkey_fingerprint: fingerprint,
            pubkey_url: options.pubkey_url,
            embedded_pubkey: options.embedded_pubkey,
            timestamp: Utc::now().trunc_subsecs(0),
            tool_name: TOOL_NAME.to_string(),
            tool_version: TOOL_VERSION.to_string(),
            tags: options.tags,
            notes: options.notes,
        })
    }

    /// Sign the canonical serialization of `metadata` with `key_id`.
    #[instrument(level = "debug", skip(self, metadata, passphrase))]
    pub fn sign_metadata(
        &self,
        metadata: AvcfMetadata,
        key_id: &str,
        passphrase: Option<&str>,
    ) -> Result<SignedAvcfBlock> {
        let canonical = metadata.canonical_bytes()?;
        let signature = self.keyring.sign_detached(&canonical, key_id, passphrase)?;
        if signature.trim().is_empty() {
            return Err(AvcfError::Crypto(format!(
                "keyring produced no signature for {key_id}"
            )));
        }

        debug!(bytes = canonical.len(), "Signed metadata");
        Ok(SignedAvcfBlock {
            metadata,
            signature,
        })
    }

    /// Import armored key text into the keyring.
    pub fn import_key(&self, armored: &str) -> Result<Vec<String>> {
        let fingerprints = self.keyring.import_key(armored)?;
        if fingerprints.is_empty() {
            return Err(AvcfError::Crypto(
                "key import produced no fingerprints".to_string(),
            ));
        }
        Ok(fingerprints)
    }

    /// Whether the keyring holds a key whose fingerprint equals
    /// `fingerprint` exactly, after normalization. No partial matching.
    pub fn has_key(&self, fingerprint: &str) -> Result<bool> {
        let wanted = normalize_fingerprint(fingerprint);
        Ok(self
            .keyring
            .list_keys()?
            .iter()
            .any(|key| normalize_fingerprint(&key.fingerprint) == wanted))
    }

    /// Verify the detached signature of a signed block.
    ///
    /// Key resolution order: exact fingerprint match in the local keyring,
    /// then the embedded key if the block carries one. A missing key is a
    /// KEY_NOT_FOUND result, not an error.
    pub fn verify_signature(&self, block: &SignedAvcfBlock) -> VerificationResult {
        let metadata = &block.metadata;

        let locally_known = match self.has_key(&metadata.pubkey_fingerprint) {
            Ok(found) => found,
            Err(e) => {
                return VerificationResult::error(
                    Some(metadata.clone()),
                    format!("failed to list keyring: {e}"),
                )
            }
        };

        if !locally_known {
            match metadata.embedded_pubkey.as_deref() {
                Some(embedded) => {
                    if let Err(e) = self.import_key(embedded) {
                        return VerificationResult::key_not_found(
                            Some(metadata.clone()),
                            format!("failed to import embedded public key: {e}"),
                        );
                    }
                    debug!("Imported embedded public key");
                }
                None => {
                    return VerificationResult::key_not_found(
                        Some(metadata.clone()),
                        format!(
                            "public key {} not found in keyring and not embedded",
                            metadata.pubkey_fingerprint
                        ),
                    );
                }
            }
        }

        let canonical = match metadata.canonical_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return VerificationResult::error(Some(metadata.clone()), e.to_string()),
        };

        match self.keyring.verify_detached(&block.signature, &canonical) {
            Ok(true) => VerificationResult::valid(metadata.clone()),
            Ok(false) => {
                VerificationResult::invalid(Some(metadata.clone()), "invalid signature")
            }
            Err(e) => VerificationResult::error(
                Some(metadata.clone()),
                format!("error verifying signature: {e}"),
            ),
        }
    }

    /// Recompute the content hash of `path` and compare it to the recorded
    /// one.
    pub fn verify_hash(&self, path: &Path, metadata: &AvcfMetadata) -> Result<bool> {
        Ok(self.hash_file(path)? == metadata.video_hash)
    }
}

fn validate_author_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AvcfError::Validation(
            "author name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Fingerprints are 40 (v4) or 64 (v5) hex digits once display spacing is
/// stripped.
fn validate_fingerprint(raw: &str) -> Result<String> {
    let normalized = normalize_fingerprint(raw);
    let all_hex = !normalized.is_empty() && normalized.chars().all(|c| c.is_ascii_hexdigit());
    if !all_hex || !(normalized.len() == 40 || normalized.len() == 64) {
        return Err(AvcfError::Validation(format!(
            "malformed key fingerprint: {raw}"
        )));
    }
    Ok(normalized)
}

fn validate_pubkey_url(raw: &str) -> Result<()> {
    let url = url::Url::parse(raw)
        .map_err(|e| AvcfError::Validation(format!("invalid public key URL {raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AvcfError::Validation(format!(
            "unsupported public key URL scheme: {scheme}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::keyring::MemoryKeyring;
    use crate::model::SignatureStatus;

    fn write_temp(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn service_with_key() -> (CryptoService<MemoryKeyring>, String) {
        let keyring = MemoryKeyring::new();
        let fingerprint = keyring.generate_key("jane");
        (CryptoService::with_keyring(keyring), fingerprint)
    }

    #[test]
    fn test_hash_file_known_digest() {
        let file = write_temp(b"abc");
        let (service, _) = service_with_key();
        assert_eq!(
            service.hash_file(file.path()).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_file_streams_large_input() {
        // Larger than one read chunk so the loop actually iterates.
        let content = vec![0x5a_u8; HASH_CHUNK_SIZE * 3 + 17];
        let file = write_temp(&content);
        let (service, _) = service_with_key();
        assert_eq!(
            service.hash_file(file.path()).unwrap(),
            hex::encode(Sha256::digest(&content))
        );
    }

    #[test]
    fn test_hash_file_missing_is_crypto_error() {
        let (service, _) = service_with_key();
        let err = service
            .hash_file(Path::new("/no/such/file.mp4"))
            .unwrap_err();
        assert!(matches!(err, AvcfError::Crypto(_)));
    }

    #[test]
    fn test_build_metadata_fills_hash_and_identity() {
        let file = write_temp(b"video bytes");
        let (service, fingerprint) = service_with_key();

        let metadata = service
            .build_metadata(file.path(), "Jane Doe", &fingerprint, MetadataOptions::default())
            .unwrap();

        assert_eq!(metadata.video_hash, service.hash_file(file.path()).unwrap());
        assert_eq!(metadata.author_name, "Jane Doe");
        assert_eq!(metadata.pubkey_fingerprint, fingerprint);
        assert_eq!(metadata.tool_name, TOOL_NAME);
        assert_eq!(metadata.tool_version, TOOL_VERSION);
        assert_eq!(metadata.timestamp.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_build_metadata_rejects_bad_fields() {
        let file = write_temp(b"video bytes");
        let (service, fingerprint) = service_with_key();

        let err = service
            .build_metadata(file.path(), "  ", &fingerprint, MetadataOptions::default())
            .unwrap_err();
        assert!(matches!(err, AvcfError::Validation(_)));

        let err = service
            .build_metadata(file.path(), "Jane", "nothex", MetadataOptions::default())
            .unwrap_err();
        assert!(matches!(err, AvcfError::Validation(_)));

        let options = MetadataOptions {
            pubkey_url: Some("ftp://example.com/key.asc".to_string()),
            ..Default::default()
        };
        let err = service
            .build_metadata(file.path(), "Jane", &fingerprint, options)
            .unwrap_err();
        assert!(matches!(err, AvcfError::Validation(_)));
    }

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let file = write_temp(b"video bytes");
        let (service, fingerprint) = service_with_key();

        let metadata = service
            .build_metadata(file.path(), "Jane Doe", &fingerprint, MetadataOptions::default())
            .unwrap();
        let block = service.sign_metadata(metadata, &fingerprint, None).unwrap();

        let result = service.verify_signature(&block);
        assert_eq!(result.status, SignatureStatus::Valid);
        assert_eq!(result.metadata.unwrap().author_name, "Jane Doe");
    }

    #[test]
    fn test_verify_detects_metadata_tampering() {
        let file = write_temp(b"video bytes");
        let (service, fingerprint) = service_with_key();

        let metadata = service
            .build_metadata(file.path(), "Jane Doe", &fingerprint, MetadataOptions::default())
            .unwrap();
        let mut block = service.sign_metadata(metadata, &fingerprint, None).unwrap();
        block.metadata.author_name = "Someone Else".to_string();

        let result = service.verify_signature(&block);
        assert_eq!(result.status, SignatureStatus::Invalid);
        assert!(result.error_message.unwrap().contains("invalid signature"));
    }

    #[test]
    fn test_verify_without_key_is_key_not_found() {
        let file = write_temp(b"video bytes");
        let (service, fingerprint) = service_with_key();

        let metadata = service
            .build_metadata(file.path(), "Jane Doe", &fingerprint, MetadataOptions::default())
            .unwrap();
        let block = service.sign_metadata(metadata, &fingerprint, None).unwrap();

        let verifier = CryptoService::with_keyring(MemoryKeyring::new());
        let result = verifier.verify_signature(&block);
        assert_eq!(result.status, SignatureStatus::KeyNotFound);
        assert!(result.error_message.unwrap().contains("not embedded"));
        assert!(result.metadata.is_some());
    }

    #[test]
    fn test_verify_imports_embedded_key() {
        let file = write_temp(b"video bytes");
        let (service, fingerprint) = service_with_key();

        let options = MetadataOptions {
            embedded_pubkey: Some(service.keyring().export_public_key(&fingerprint).unwrap()),
            ..Default::default()
        };
        let metadata = service
            .build_metadata(file.path(), "Jane Doe", &fingerprint, options)
            .unwrap();
        let block = service.sign_metadata(metadata, &fingerprint, None).unwrap();

        let verifier = CryptoService::with_keyring(MemoryKeyring::new());
        let result = verifier.verify_signature(&block);
        assert_eq!(result.status, SignatureStatus::Valid);
        assert!(verifier.has_key(&fingerprint).unwrap());
    }

    #[test]
    fn test_verify_with_broken_embedded_key_is_key_not_found() {
        let file = write_temp(b"video bytes");
        let (service, fingerprint) = service_with_key();

        let options = MetadataOptions {
            embedded_pubkey: Some("not an armored key".to_string()),
            ..Default::default()
        };
        let metadata = service
            .build_metadata(file.path(), "Jane Doe", &fingerprint, options)
            .unwrap();
        let block = service.sign_metadata(metadata, &fingerprint, None).unwrap();

        let verifier = CryptoService::with_keyring(MemoryKeyring::new());
        let result = verifier.verify_signature(&block);
        assert_eq!(result.status, SignatureStatus::KeyNotFound);
        assert!(result
            .error_message
            .unwrap()
            .contains("failed to import embedded public key"));
    }

    #[test]
    fn test_sign_with_unknown_key_fails() {
        let file = write_temp(b"video bytes");
        let (service, fingerprint) = service_with_key();

        let metadata = service
            .build_metadata(file.path(), "Jane Doe", &fingerprint, MetadataOptions::default())
            .unwrap();
        let err = service
            .sign_metadata(metadata, "AAAABBBBCCCCDDDD", None)
            .unwrap_err();
        assert!(matches!(err, AvcfError::Crypto(_)));
    }

    #[test]
    fn test_verify_hash_matches_and_mismatches() {
        let file = write_temp(b"video bytes");
        let (service, fingerprint) = service_with_key();

        let metadata = service
            .build_metadata(file.path(), "Jane Doe", &fingerprint, MetadataOptions::default())
            .unwrap();
        assert!(service.verify_hash(file.path(), &metadata).unwrap());

        let other = write_temp(b"different bytes");
        assert!(!service.verify_hash(other.path(), &metadata).unwrap());
    }

    #[test]
    fn test_import_key_requires_fingerprints() {
        let (service, _) = service_with_key();
        let err = service.import_key("garbage").unwrap_err();
        assert!(matches!(err, AvcfError::Crypto(_)));
    }
}
