//! User-facing output formatting.

use anyhow::Result;
use avcf_core::{SignatureStatus, VerificationResult};
use colored::Colorize;

/// Print a verification result, human-readable or as JSON.
pub fn print_verification(result: &VerificationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let status = result.status.to_string();
    let status = match result.status {
        SignatureStatus::Valid => status.green().bold(),
        SignatureStatus::Missing => status.yellow().bold(),
        _ => status.red().bold(),
    };
    println!("Verification status: {status}");

    if let Some(message) = &result.error_message {
        println!("  {} {message}", "Reason:".dimmed());
    }

    if let Some(metadata) = &result.metadata {
        println!();
        println!("  {} {}", "Author:".dimmed(), metadata.author_name);
        if let Some(email) = &metadata.author_email {
            println!("  {} {email}", "Email:".dimmed());
        }
        if let Some(org) = &metadata.author_organization {
            println!("  {} {org}", "Organization:".dimmed());
        }
        println!(
            "  {} {}",
            "Signed at:".dimmed(),
            metadata.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!(
            "  {} {}",
            "Fingerprint:".dimmed(),
            metadata.pubkey_fingerprint
        );
        if let Some(url) = &metadata.pubkey_url {
            println!("  {} {url}", "Key URL:".dimmed());
        }
        if metadata.embedded_pubkey.is_some() {
            println!("  {} embedded in metadata", "Public key:".dimmed());
        }
        if let Some(tags) = &metadata.tags {
            println!("  {} {}", "Tags:".dimmed(), tags.join(", "));
        }
        if let Some(notes) = &metadata.notes {
            println!("  {} {notes}", "Notes:".dimmed());
        }
    }

    Ok(())
}

/// Print the sign/process success line.
pub fn print_signed(path: &std::path::Path, json: bool) {
    if json {
        println!("{}", serde_json::json!({ "signed": path }));
    } else {
        println!("{} {}", "Video signed:".green().bold(), path.display());
    }
}
