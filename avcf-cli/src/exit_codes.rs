//! Exit codes for the avcf binary.
//!
//! 0 = success, including a VALID verification; 1 = engine failure or a
//! non-VALID verification result; 2 = unexpected error.

use std::process::ExitCode;

use avcf_core::AvcfError;

pub const SUCCESS: u8 = 0;
pub const FAILURE: u8 = 1;
pub const UNEXPECTED: u8 = 2;

/// Map an error chain to an exit code: engine errors are expected domain
/// failures, anything else is unexpected.
pub fn classify(err: &anyhow::Error) -> ExitCode {
    if is_engine_error(err) {
        ExitCode::from(FAILURE)
    } else {
        ExitCode::from(UNEXPECTED)
    }
}

/// Whether the chain contains an engine error (this also picks the error
/// prefix printed to stderr).
pub fn is_engine_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<AvcfError>().is_some())
}
