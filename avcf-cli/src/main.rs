//! AVCF CLI - sign and verify authenticated video containers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod output;

#[derive(Parser)]
#[command(name = "avcf")]
#[command(author, version, about = "Authenticated video container signing and verification", long_about = None)]
struct Cli {
    /// Keyring home directory (an ephemeral one is used when omitted)
    #[arg(long, global = true, value_name = "DIR")]
    keyring_home: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a video file with a provenance record
    Sign(SignArgs),

    /// Verify the provenance record embedded in a video file
    Verify(VerifyArgs),

    /// Process a video with ffmpeg, then sign the result
    Process(ProcessArgs),
}

#[derive(Args)]
struct SignArgs {
    /// Path to the input video
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output path (defaults to `<stem>_signed.<ext>` next to the input)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(flatten)]
    signing: SigningArgs,
}

#[derive(Args)]
struct VerifyArgs {
    /// Path to the video to verify
    #[arg(value_name = "VIDEO")]
    video: PathBuf,

    /// Do not fetch missing public keys from URLs
    #[arg(long)]
    no_fetch_keys: bool,
}

#[derive(Args)]
struct ProcessArgs {
    /// Path to the input video
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Path to the processed, signed output video
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Extra ffmpeg output argument, repeatable, passed through in order
    /// (e.g. `--ffmpeg-arg=-vf --ffmpeg-arg=scale=1280:720`)
    #[arg(long = "ffmpeg-arg", value_name = "ARG", allow_hyphen_values = true)]
    ffmpeg_args: Vec<String>,

    #[command(flatten)]
    signing: SigningArgs,
}

/// Signing flags shared by `sign` and `process`.
#[derive(Args)]
struct SigningArgs {
    /// Id or fingerprint of the signing key
    #[arg(short, long, value_name = "KEY")]
    key: String,

    /// Author name recorded in the metadata
    #[arg(short = 'n', long)]
    author_name: String,

    /// Author email
    #[arg(short = 'e', long)]
    author_email: Option<String>,

    /// Author organization
    #[arg(short = 'g', long)]
    author_org: Option<String>,

    /// URL verifiers can fetch the public key from
    #[arg(short = 'u', long)]
    pubkey_url: Option<String>,

    /// Embed the public key in the metadata for offline verification
    #[arg(long)]
    embed_pubkey: bool,

    /// Tag for categorization; repeatable
    #[arg(short, long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    /// Free-form notes about the content
    #[arg(long)]
    notes: Option<String>,

    /// File containing the signing key passphrase
    #[arg(long, value_name = "FILE")]
    passphrase_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Sign(args) => commands::sign::execute(&cli, args),
        Commands::Verify(args) => commands::verify::execute(&cli, args),
        Commands::Process(args) => commands::process::execute(&cli, args),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            if exit_codes::is_engine_error(&err) {
                eprintln!("Error: {err:#}");
            } else {
                eprintln!("Unexpected error: {err:#}");
            }
            exit_codes::classify(&err)
        }
    }
}
