//! Verify command implementation.

use std::process::ExitCode;

use anyhow::Result;
use avcf_core::{VerificationService, VerifyOptions};
use tracing::info;

use crate::{exit_codes, output, Cli, VerifyArgs};

/// Execute the verify command.
///
/// Non-VALID results are not errors: the structured result is still
/// printed, and the exit code reports the verdict.
pub fn execute(cli: &Cli, args: &VerifyArgs) -> Result<ExitCode> {
    let service = match &cli.keyring_home {
        Some(home) => VerificationService::with_home(home),
        None => VerificationService::new()?,
    };
    let options = VerifyOptions {
        fetch_keys: !args.no_fetch_keys,
    };

    let result = service.verify_video(&args.video, &options)?;
    info!(status = %result.status, "Verification complete");

    output::print_verification(&result, cli.json)?;

    if result.is_valid() {
        Ok(ExitCode::from(exit_codes::SUCCESS))
    } else {
        Ok(ExitCode::from(exit_codes::FAILURE))
    }
}
