//! Sign command implementation.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use avcf_core::{SignRequest, SigningService};
use tracing::info;

use crate::{exit_codes, output, Cli, SignArgs, SigningArgs};

/// Execute the sign command.
pub fn execute(cli: &Cli, args: &SignArgs) -> Result<ExitCode> {
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));

    let request = build_request(&args.signing)?;
    let service = signing_service(cli)?;

    let signed = service.sign_video(&args.input, &output_path, &request)?;
    info!(path = %signed.display(), "Sign complete");

    output::print_signed(&signed, cli.json);
    Ok(ExitCode::from(exit_codes::SUCCESS))
}

/// `clip.mp4` becomes `clip_signed.mp4` next to the input.
pub(crate) fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let name = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_signed.{ext}"),
        None => format!("{stem}_signed"),
    };
    input.with_file_name(name)
}

pub(crate) fn build_request(args: &SigningArgs) -> Result<SignRequest> {
    let passphrase = match &args.passphrase_file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read passphrase file: {}", path.display()))?
                .trim_end_matches(['\r', '\n'])
                .to_string(),
        ),
        None => None,
    };

    Ok(SignRequest {
        key_id: args.key.clone(),
        author_name: args.author_name.clone(),
        author_email: args.author_email.clone(),
        author_organization: args.author_org.clone(),
        pubkey_url: args.pubkey_url.clone(),
        embed_pubkey: args.embed_pubkey,
        passphrase,
        tags: if args.tags.is_empty() {
            None
        } else {
            Some(args.tags.clone())
        },
        notes: args.notes.clone(),
    })
}

pub(crate) fn signing_service(cli: &Cli) -> Result<SigningService> {
    Ok(match &cli.keyring_home {
        Some(home) => SigningService::with_home(home),
        None => SigningService::new()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("clip.mp4")),
            PathBuf::from("clip_signed.mp4")
        );
        assert_eq!(
            default_output_path(Path::new("/videos/take two.mkv")),
            PathBuf::from("/videos/take two_signed.mkv")
        );
        assert_eq!(
            default_output_path(Path::new("noext")),
            PathBuf::from("noext_signed")
        );
    }
}
