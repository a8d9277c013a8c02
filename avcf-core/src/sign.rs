//! Signing orchestrator.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::container::adapter_for_path;
use crate::crypto::{CryptoService, MetadataOptions};
use crate::error::{AvcfError, Result};
use crate::ffmpeg::FfmpegTool;
use crate::keyring::{GpgKeyring, KeyEntry, KeyringBackend};
use crate::model::SignedAvcfBlock;

/// Everything a sign run needs besides the input and output paths.
#[derive(Debug, Clone, Default)]
pub struct SignRequest {
    /// Key id or fingerprint of the signing key.
    pub key_id: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub author_organization: Option<String>,
    /// Where verifiers can fetch the public key.
    pub pubkey_url: Option<String>,
    /// Attach the armored public key to the metadata for offline
    /// verification.
    pub embed_pubkey: bool,
    pub passphrase: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
}

/// Produces signed output files. A linear pipeline: any stage failure
/// aborts the whole run.
pub struct SigningService<K: KeyringBackend = GpgKeyring> {
    crypto: CryptoService<K>,
}

impl SigningService<GpgKeyring> {
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

impl<K: KeyringBackend> SigningService<K> {
    pub fn with_crypto(crypto: CryptoService<K>) -> Self {
        Self { crypto }
    }

    pub fn crypto(&self) -> &CryptoService<K> {
        &self.crypto
    }

    /// Sign `input` and write the tagged copy to `output`. The adapter is
    /// selected by the output extension.
    #[instrument(level = "info", skip(self, request), fields(key_id = %request.key_id))]
    pub fn sign_video(&self, input: &Path, output: &Path, request: &SignRequest) -> Result<PathBuf> {
        let block = self.create_signed_block(input, request)?;
        let adapter = adapter_for_path(output)?;
        adapter.embed(input, output, &block)?;

        info!(output = %output.display(), "Video signed");
        Ok(output.to_path_buf())
    }

    /// The signing pipeline up to, but not including, container embedding.
    pub fn create_signed_block(&self, input: &Path, request: &SignRequest) -> Result<SignedAvcfBlock> {
        let key = self.resolve_signing_key(&request.key_id)?;
        debug!(fingerprint = %key.fingerprint, "Resolved signing key");

        let embedded_pubkey = if request.embed_pubkey {
            Some(self.crypto.keyring().export_public_key(&key.fingerprint)?)
        } else {
            None
        };

        let options = MetadataOptions {
            author_email: request.author_email.clone(),
            author_organization: request.author_organization.clone(),
            pubkey_url: request.pubkey_url.clone(),
            embedded_pubkey,
            tags: request.tags.clone(),
            notes: request.notes.clone(),
        };
        let metadata =
            self.crypto
                .build_metadata(input, &request.author_name, &key.fingerprint, options)?;
        self.crypto
            .sign_metadata(metadata, &request.key_id, request.passphrase.as_deref())
    }

    /// Process `input` with ffmpeg first, then sign the result into
    /// `output`. The intermediate file lives in a scoped staging directory
    /// that is removed on every exit path.
    #[instrument(level = "info", skip(self, ffmpeg_args, request))]
    pub fn process_and_sign(
        &self,
        input: &Path,
        output: &Path,
        ffmpeg_args: &[String],
        request: &SignRequest,
    ) -> Result<PathBuf> {
        let staging = tempfile::tempdir()
            .map_err(|e| AvcfError::Container(format!("failed to create staging directory: {e}")))?;
        let file_name = output.file_name().ok_or_else(|| {
            AvcfError::Container(format!("output path has no file name: {}", output.display()))
        })?;
        let processed = staging.path().join(file_name);

        FfmpegTool::new().transcode(input, &processed, ffmpeg_args)?;
        self.sign_video(&processed, output, request)
    }

    fn resolve_signing_key(&self, key_id: &str) -> Result<KeyEntry> {
        self.crypto
            .keyring()
            .list_keys()?
            .into_iter()
            .find(|key| key.matches(key_id))
            .ok_or_else(|| AvcfError::Key(format!("private key not found: {key_id}")))
    }
}
