//! Process-and-sign command implementation.

use std::process::ExitCode;

use anyhow::Result;
use tracing::info;

use crate::commands::sign::{build_request, signing_service};
use crate::{exit_codes, output, Cli, ProcessArgs};

/// Execute the process command: run ffmpeg over the input, then sign the
/// processed file into the output path.
pub fn execute(cli: &Cli, args: &ProcessArgs) -> Result<ExitCode> {
    let request = build_request(&args.signing)?;
    let service = signing_service(cli)?;

    let signed =
        service.process_and_sign(&args.input, &args.output, &args.ffmpeg_args, &request)?;
    info!(path = %signed.display(), "Process and sign complete");

    output::print_signed(&signed, cli.json);
    Ok(ExitCode::from(exit_codes::SUCCESS))
}
