//! GnuPG keyring backend.
//!
//! Shells out to the `gpg` binary. All key state lives under one home
//! directory: either a caller-supplied path, or an ephemeral directory that
//! is created at construction and removed again when the keyring is dropped,
//! whatever the exit path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, instrument, warn};

use super::{KeyEntry, KeyringBackend};
use crate::error::{AvcfError, Result};

const DEFAULT_GPG_PROGRAM: &str = "gpg";

#[derive(Debug)]
enum KeyringHome {
    /// Caller-supplied directory, left in place.
    Persistent(PathBuf),
    /// Process-private directory, deleted on drop.
    Ephemeral(TempDir),
}

impl KeyringHome {
    fn path(&self) -> &Path {
        match self {
            Self::Persistent(path) => path,
            Self::Ephemeral(dir) => dir.path(),
        }
    }
}

/// OpenPGP keyring backed by the `gpg` binary.
#[derive(Debug)]
pub struct GpgKeyring {
    home: KeyringHome,
    program: String,
}

impl GpgKeyring {
    /// Keyring over an ephemeral home directory.
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().map_err(|e| {
            AvcfError::Crypto(format!("failed to create ephemeral keyring home: {e}"))
        })?;

        // gpg refuses group/other-accessible homes.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700)).map_err(
                |e| AvcfError::Crypto(format!("failed to restrict keyring home permissions: {e}")),
            )?;
        }

        Ok(Self {
            home: KeyringHome::Ephemeral(dir),
            program: DEFAULT_GPG_PROGRAM.to_string(),
        })
    }

    /// Keyring over an existing home directory.
    pub fn with_home(path: impl Into<PathBuf>) -> Self {
        Self {
            home: KeyringHome::Persistent(path.into()),
            program: DEFAULT_GPG_PROGRAM.to_string(),
        }
    }

    /// Override the gpg executable, e.g. `gpg2` on older distributions.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn home_path(&self) -> &Path {
        self.home.path()
    }

    fn run(&self, args: &[&str], stdin_data: Option<&[u8]>) -> Result<Output> {
        debug!(program = %self.program, ?args, "Running gpg");

        let mut child = Command::new(&self.program)
            .arg("--homedir")
            .arg(self.home.path())
            .args(["--batch", "--no-tty"])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AvcfError::Crypto(format!("failed to run {}: {e}", self.program)))?;

        if let Some(data) = stdin_data {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| AvcfError::Crypto("gpg stdin unavailable".to_string()))?;
            stdin
                .write_all(data)
                .map_err(|e| AvcfError::Crypto(format!("failed to write to gpg stdin: {e}")))?;
        } else {
            drop(child.stdin.take());
        }

        child
            .wait_with_output()
            .map_err(|e| AvcfError::Crypto(format!("failed to wait for gpg: {e}")))
    }

    fn stderr_text(output: &Output) -> String {
        String::from_utf8_lossy(&output.stderr).trim().to_string()
    }
}

impl KeyringBackend for GpgKeyring {
    #[instrument(level = "debug", skip(self))]
    fn list_keys(&self) -> Result<Vec<KeyEntry>> {
        let output = self.run(&["--with-colons", "--list-keys"], None)?;
        if !output.status.success() {
            return Err(AvcfError::Crypto(format!(
                "gpg failed to list keys: {}",
                Self::stderr_text(&output)
            )));
        }
        Ok(parse_key_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    #[instrument(level = "debug", skip(self))]
    fn export_public_key(&self, fingerprint: &str) -> Result<String> {
        let output = self.run(&["--armor", "--export", fingerprint], None)?;
        if !output.status.success() {
            return Err(AvcfError::Key(format!(
                "failed to export public key {fingerprint}: {}",
                Self::stderr_text(&output)
            )));
        }
        let armored = String::from_utf8_lossy(&output.stdout).to_string();
        if armored.trim().is_empty() {
            return Err(AvcfError::Key(format!(
                "export of {fingerprint} produced no key material"
            )));
        }
        Ok(armored)
    }

    #[instrument(level = "debug", skip(self, data, passphrase))]
    fn sign_detached(
        &self,
        data: &[u8],
        key_id: &str,
        passphrase: Option<&str>,
    ) -> Result<String> {
        let mut args = vec![
            "--pinentry-mode",
            "loopback",
            "--yes",
            "--armor",
            "--local-user",
            key_id,
        ];
        if let Some(pass) = passphrase {
            args.push("--passphrase");
            args.push(pass);
        }
        args.extend(["--output", "-", "--detach-sign"]);

        let output = self.run(&args, Some(data))?;
        if !output.status.success() {
            return Err(AvcfError::Crypto(format!(
                "gpg failed to sign with {key_id}: {}",
                Self::stderr_text(&output)
            )));
        }

        let signature = String::from_utf8_lossy(&output.stdout).to_string();
        if signature.trim().is_empty() {
            return Err(AvcfError::Crypto(format!(
                "gpg produced no signature for {key_id}"
            )));
        }
        Ok(signature)
    }

    #[instrument(level = "debug", skip(self, signature, data))]
    fn verify_detached(&self, signature: &str, data: &[u8]) -> Result<bool> {
        // gpg insists on reading a detached signature from a file; the data
        // arrives on stdin. The temp file is removed when it drops.
        let mut sig_file = NamedTempFile::new()
            .map_err(|e| AvcfError::Crypto(format!("failed to stage signature: {e}")))?;
        sig_file
            .write_all(signature.as_bytes())
            .and_then(|()| sig_file.flush())
            .map_err(|e| AvcfError::Crypto(format!("failed to stage signature: {e}")))?;

        let sig_path = sig_file.path().to_string_lossy().into_owned();
        let output = self.run(&["--verify", &sig_path, "-"], Some(data))?;

        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => {
                debug!("gpg reported a bad signature");
                Ok(false)
            }
            _ => Err(AvcfError::Crypto(format!(
                "gpg verify failed: {}",
                Self::stderr_text(&output)
            ))),
        }
    }

    #[instrument(level = "debug", skip(self, armored))]
    fn import_key(&self, armored: &str) -> Result<Vec<String>> {
        let output = self.run(&["--status-fd", "1", "--import"], Some(armored.as_bytes()))?;
        if !output.status.success() {
            warn!(stderr = %Self::stderr_text(&output), "gpg import failed");
            return Err(AvcfError::Crypto(format!(
                "gpg import failed: {}",
                Self::stderr_text(&output)
            )));
        }
        Ok(parse_import_fingerprints(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

/// Parse `gpg --with-colons --list-keys` output into key entries.
///
/// Only the fingerprint record directly following a `pub` record counts;
/// subkey fingerprints are skipped.
fn parse_key_listing(listing: &str) -> Vec<KeyEntry> {
    let mut entries = Vec::new();
    let mut pending_key_id: Option<String> = None;

    for line in listing.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        match fields.first().copied() {
            Some("pub") | Some("sec") => {
                pending_key_id = fields.get(4).map(|id| (*id).to_string());
            }
            Some("fpr") => {
                if let (Some(key_id), Some(fingerprint)) = (pending_key_id.take(), fields.get(9)) {
                    if !fingerprint.is_empty() {
                        entries.push(KeyEntry {
                            key_id,
                            fingerprint: (*fingerprint).to_string(),
                        });
                    }
                }
            }
            Some("sub") | Some("ssb") => {
                pending_key_id = None;
            }
            _ => {}
        }
    }
    entries
}

/// Pull fingerprints out of `--status-fd` import output.
fn parse_import_fingerprints(status: &str) -> Vec<String> {
    let mut fingerprints: Vec<String> = Vec::new();
    for line in status.lines() {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("[GNUPG:]") || parts.next() != Some("IMPORT_OK") {
            continue;
        }
        let _reason_flags = parts.next();
        if let Some(fingerprint) = parts.next() {
            if !fingerprints.iter().any(|f| f == fingerprint) {
                fingerprints.push(fingerprint.to_string());
            }
        }
    }
    fingerprints
}
