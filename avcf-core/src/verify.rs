//! Verification orchestrator.
//!
//! A small decision procedure with explicit fallback branches: extract the
//! signed block, resolve the signer's key (local keyring, then a remote
//! fetch when enabled, then the embedded key), check the signature, then
//! check the content hash. Each external call is attempted at most once.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::container::adapter_for_path;
use crate::crypto::CryptoService;
use crate::error::Result;
use crate::fetch::KeyFetcher;
use crate::keyring::{GpgKeyring, KeyringBackend};
use crate::model::{SignedAvcfBlock, VerificationResult};

/// Verification behavior toggles.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Fetch missing public keys from the record's URL.
    pub fetch_keys: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self { fetch_keys: true }
    }
}

/// Produces verification verdicts. Never mutates the file under test.
pub struct VerificationService<K: KeyringBackend = GpgKeyring> {
    crypto: CryptoService<K>,
}

impl VerificationService<GpgKeyring> {
    /// Service over an ephemeral keyring home.
    pub fn new() -> Result<Self> {
        Ok(Self {
            crypto: CryptoService::new()?,
        })
    }

    /// Service over an existing keyring home.
    pub fn with_home(path: impl Into<PathBuf>) -> Self {
        Self {
            crypto: CryptoService::with_home(path),
        }
    }
}

impl<K: KeyringBackend> VerificationService<K> {
    pub fn with_crypto(crypto: CryptoService<K>) -> Self {
        Self { crypto }
    }

    pub fn crypto(&self) -> &CryptoService<K> {
        &self.crypto
    }

    /// Verify the signed block embedded in `video_path`.
    ///
    /// A container with no block yields a MISSING result; tool failures are
    /// errors so callers can tell "nothing to verify" apart from "the tool
    /// broke".
    #[instrument(level = "info", skip(self, options))]
    pub fn verify_video(&self, video_path: &Path, options: &VerifyOptions) -> Result<VerificationResult> {
        let adapter = adapter_for_path(video_path)?;
        let block = adapter.extract(video_path)?;

        match block {
            Some(block) => self.verify_block(&block, video_path, options),
            None => {
                info!(path = %video_path.display(), "No signed block found");
                Ok(VerificationResult::missing(
                    "no signed provenance record found in the video file",
                ))
            }
        }
    }

    /// Verify an already-extracted block against the file it came from.
    pub fn verify_block(
        &self,
        block: &SignedAvcfBlock,
        video_path: &Path,
        options: &VerifyOptions,
    ) -> Result<VerificationResult> {
        let metadata = &block.metadata;

        if let Some(url) = metadata.pubkey_url.as_deref() {
            if options.fetch_keys && !self.crypto.has_key(&metadata.pubkey_fingerprint)? {
                if let Err(fetch_err) = self.fetch_and_import(url) {
                    warn!(%url, error = %fetch_err, "Remote key fetch failed");
                    match metadata.embedded_pubkey.as_deref() {
                        Some(embedded) => {
                            if let Err(import_err) = self.crypto.import_key(embedded) {
                                return Ok(VerificationResult::key_not_found(
                                    Some(metadata.clone()),
                                    format!(
                                        "failed to fetch key from URL and failed to import embedded key: {fetch_err}; {import_err}"
                                    ),
                                ));
                            }
                            debug!("Fell back to the embedded public key");
                        }
                        None => {
                            return Ok(VerificationResult::key_not_found(
                                Some(metadata.clone()),
                                format!(
                                    "failed to fetch key from URL and no embedded key available: {fetch_err}"
                                ),
                            ));
                        }
                    }
                }
            }
        }

        let signature_result = self.crypto.verify_signature(block);
        if !signature_result.is_valid() {
            return Ok(signature_result);
        }

        // A valid signature over a hash that no longer matches the file is
        // detected tampering, not a valid result.
        if !self.crypto.verify_hash(video_path, metadata)? {
            info!(path = %video_path.display(), "Content hash mismatch");
            return Ok(VerificationResult::invalid(
                Some(metadata.clone()),
                "video hash does not match the hash in the metadata",
            ));
        }

        Ok(signature_result)
    }

    fn fetch_and_import(&self, url: &str) -> Result<Vec<String>> {
        let key_text = KeyFetcher::new()?.fetch(url)?;
        self.crypto.import_key(&key_text)
    }
}
