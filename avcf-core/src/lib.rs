//! AVCF Core - Authenticated Video Container Format engine
//!
//! This crate embeds a tamper-evident, cryptographically signed provenance
//! record into a video container and verifies authorship and integrity
//! later. The record binds the author's OpenPGP key to a SHA-256 hash of
//! the container bytes, travels as a single JSON-valued metadata tag
//! (`avcf_auth` in MP4, `AVCF_AUTH` in Matroska/WebM), and is checked
//! through a fixed decision procedure with local-keyring, remote-fetch and
//! embedded-key resolution.
//!
//! # Features
//!
//! - Detached OpenPGP signatures over a versioned canonical metadata
//!   encoding
//! - Whole-file SHA-256 content binding, streamed
//! - MP4 and Matroska/WebM container adapters over ffmpeg/ffprobe
//! - Key resolution with remote fetch and embedded-key fallback
//! - Ephemeral keyring homes removed on every exit path
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use avcf_core::{SignRequest, SigningService, VerificationService, VerifyOptions};
//!
//! # fn example() -> avcf_core::Result<()> {
//! let signer = SigningService::with_home("/home/jane/.gnupg");
//! let request = SignRequest {
//!     key_id: "5FBE8F7B07B4328D".to_string(),
//!     author_name: "Jane Doe".to_string(),
//!     embed_pubkey: true,
//!     ..Default::default()
//! };
//! signer.sign_video(Path::new("raw.mp4"), Path::new("signed.mp4"), &request)?;
//!
//! let verifier = VerificationService::new()?;
//! let result = verifier.verify_video(Path::new("signed.mp4"), &VerifyOptions::default())?;
//! println!("{}", result.status);
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod crypto;
pub mod error;
pub mod fetch;
pub mod ffmpeg;
pub mod keyring;
pub mod model;
pub mod sign;
pub mod verify;

// Re-export main types for convenience
pub use container::{adapter_for_path, ContainerAdapter, MATROSKA_TAG_KEY, MP4_TAG_KEY};
pub use crypto::{CryptoService, MetadataOptions, TOOL_NAME, TOOL_VERSION};
pub use error::{AvcfError, Result};
pub use fetch::KeyFetcher;
pub use ffmpeg::FfmpegTool;
pub use keyring::{GpgKeyring, KeyEntry, KeyringBackend, MemoryKeyring};
pub use model::{
    AvcfMetadata, SignatureStatus, SignedAvcfBlock, VerificationResult, CANONICAL_FORMAT_VERSION,
};
pub use sign::{SignRequest, SigningService};
pub use verify::{VerificationService, VerifyOptions};
