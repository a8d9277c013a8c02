use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AvcfError, Result};

/// Version of the canonical metadata encoding that signatures are computed
/// over.
///
/// Version 1 is defined as: compact JSON with no incidental whitespace,
/// fields in the order they are declared on [`AvcfMetadata`], absent optional
/// fields omitted entirely, and timestamps rendered as UTC
/// `%Y-%m-%dT%H:%M:%SZ` with whole-second precision. Two implementations
/// that follow this paragraph produce byte-identical serializations.
pub const CANONICAL_FORMAT_VERSION: u32 = 1;

/// Outcome classes of a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Valid,
    Invalid,
    Missing,
    KeyNotFound,
    Error,
}

impl std::fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Missing => "MISSING",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::Error => "ERROR",
        };
        write!(f, "{label}")
    }
}

/// The provenance record embedded in a video container.
///
/// Field order is part of the canonical encoding; do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvcfMetadata {
    /// SHA-256 hex digest of the full container bytes at signing time.
    /// The whole file is hashed, not isolated AV streams, so any later
    /// change to the container bytes invalidates it.
    pub video_hash: String,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_organization: Option<String>,
    /// Canonical OpenPGP fingerprint of the signing key.
    pub pubkey_fingerprint: String,
    /// Where verifiers can fetch the signer's public key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey_url: Option<String>,
    /// Armored public key carried inside the record for offline verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_pubkey: Option<String>,
    /// Signature creation time, UTC, whole-second precision.
    #[serde(with = "canonical_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub tool_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AvcfMetadata {
    /// The canonical byte serialization signatures are computed over.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AvcfError::Crypto(format!("failed to canonicalize metadata: {e}")))
    }
}

/// Fixed-precision UTC timestamp encoding used by the canonical form.
pub(crate) mod canonical_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// Metadata plus its detached signature: the embedded tag payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedAvcfBlock {
    pub metadata: AvcfMetadata,
    /// Detached armored signature over the canonical metadata bytes.
    pub signature: String,
}

/// Outcome of one verification run. Built once, then read-only.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub status: SignatureStatus,
    /// Extracted metadata, present whenever a block was found, even on
    /// failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AvcfMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(with = "canonical_timestamp")]
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    fn new(
        status: SignatureStatus,
        metadata: Option<AvcfMetadata>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            status,
            metadata,
            error_message,
            verified_at: Utc::now().trunc_subsecs(0),
        }
    }

    pub fn valid(metadata: AvcfMetadata) -> Self {
        Self::new(SignatureStatus::Valid, Some(metadata), None)
    }

    pub fn invalid(metadata: Option<AvcfMetadata>, message: impl Into<String>) -> Self {
        Self::new(SignatureStatus::Invalid, metadata, Some(message.into()))
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self::new(SignatureStatus::Missing, None, Some(message.into()))
    }

    pub fn key_not_found(metadata: Option<AvcfMetadata>, message: impl Into<String>) -> Self {
        Self::new(SignatureStatus::KeyNotFound, metadata, Some(message.into()))
    }

    pub fn error(metadata: Option<AvcfMetadata>, message: impl Into<String>) -> Self {
        Self::new(SignatureStatus::Error, metadata, Some(message.into()))
    }

    pub fn is_valid(&self) -> bool {
        self.status == SignatureStatus::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 16, 3, 12, 59).unwrap()
    }

    fn full_metadata() -> AvcfMetadata {
        AvcfMetadata {
            video_hash: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
                .to_string(),
            author_name: "Jane Doe".to_string(),
            author_email: Some("jane@example.com".to_string()),
            author_organization: None,
            pubkey_fingerprint: "D4C9D8F2E1A1D8BB2F09768A5FBE8F7B07B4328D".to_string(),
            pubkey_url: Some("https://example.com/keys/jane.asc".to_string()),
            embedded_pubkey: None,
            timestamp: sample_timestamp(),
            tool_name: "avcf-sign".to_string(),
            tool_version: "0.1.0".to_string(),
            tags: Some(vec!["news".to_string(), "raw".to_string()]),
            notes: None,
        }
    }

    #[test]
    fn test_canonical_bytes_are_fixed() {
        let canonical = String::from_utf8(full_metadata().canonical_bytes().unwrap()).unwrap();
        let expected = concat!(
            "{\"video_hash\":\"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\",",
            "\"author_name\":\"Jane Doe\",",
            "\"author_email\":\"jane@example.com\",",
            "\"pubkey_fingerprint\":\"D4C9D8F2E1A1D8BB2F09768A5FBE8F7B07B4328D\",",
            "\"pubkey_url\":\"https://example.com/keys/jane.asc\",",
            "\"timestamp\":\"2025-06-16T03:12:59Z\",",
            "\"tool_name\":\"avcf-sign\",",
            "\"tool_version\":\"0.1.0\",",
            "\"tags\":[\"news\",\"raw\"]}",
        );
        assert_eq!(canonical, expected);
    }

    #[test]
    fn test_canonical_bytes_omit_absent_fields() {
        let mut metadata = full_metadata();
        metadata.author_email = None;
        metadata.pubkey_url = None;
        metadata.tags = None;

        let canonical = String::from_utf8(metadata.canonical_bytes().unwrap()).unwrap();
        assert!(!canonical.contains("author_email"));
        assert!(!canonical.contains("pubkey_url"));
        assert!(!canonical.contains("tags"));
        assert!(!canonical.contains("null"));
    }

    #[test]
    fn test_canonical_bytes_survive_json_roundtrip() {
        let metadata = full_metadata();
        let canonical = metadata.canonical_bytes().unwrap();

        let restored: AvcfMetadata = serde_json::from_slice(&canonical).unwrap();
        assert_eq!(restored, metadata);
        assert_eq!(restored.canonical_bytes().unwrap(), canonical);
    }

    #[test]
    fn test_timestamp_rejects_subsecond_precision() {
        let canonical = String::from_utf8(full_metadata().canonical_bytes().unwrap()).unwrap();
        let fuzzed = canonical.replace("2025-06-16T03:12:59Z", "2025-06-16T03:12:59.123Z");
        assert!(serde_json::from_str::<AvcfMetadata>(&fuzzed).is_err());
    }

    #[test]
    fn test_signed_block_wire_shape() {
        let block = SignedAvcfBlock {
            metadata: full_metadata(),
            signature: "-----BEGIN PGP SIGNATURE-----\nabc\n-----END PGP SIGNATURE-----"
                .to_string(),
        };
        let value: serde_json::Value = serde_json::to_value(&block).unwrap();
        assert!(value.get("metadata").is_some());
        assert!(value.get("signature").is_some());
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_status_serde_and_display() {
        assert_eq!(
            serde_json::to_string(&SignatureStatus::KeyNotFound).unwrap(),
            "\"key_not_found\""
        );
        assert_eq!(
            serde_json::from_str::<SignatureStatus>("\"valid\"").unwrap(),
            SignatureStatus::Valid
        );
        assert_eq!(SignatureStatus::KeyNotFound.to_string(), "KEY_NOT_FOUND");
        assert_eq!(SignatureStatus::Invalid.to_string(), "INVALID");
    }

    #[test]
    fn test_result_constructors_carry_status() {
        let valid = VerificationResult::valid(full_metadata());
        assert!(valid.is_valid());
        assert!(valid.error_message.is_none());

        let missing = VerificationResult::missing("no record found");
        assert_eq!(missing.status, SignatureStatus::Missing);
        assert!(missing.metadata.is_none());

        let invalid = VerificationResult::invalid(Some(full_metadata()), "hash mismatch");
        assert_eq!(invalid.status, SignatureStatus::Invalid);
        assert!(invalid.metadata.is_some());
        assert!(!invalid.is_valid());
    }
}
