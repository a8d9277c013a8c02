//! FFmpeg integration.
//!
//! The multimedia tool is an external collaborator: copy streams unchanged
//! while setting one metadata tag, probe a container's tag maps, and run
//! caller-directed processing passes. Everything shells out to the `ffmpeg`
//! and `ffprobe` binaries.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::{AvcfError, Result};

const DEFAULT_FFMPEG_PROGRAM: &str = "ffmpeg";
const DEFAULT_FFPROBE_PROGRAM: &str = "ffprobe";

/// Tag maps probed from a container.
#[derive(Debug, Default)]
pub struct ContainerTags {
    pub format_tags: HashMap<String, String>,
    pub stream_tags: Vec<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Wrapper around the `ffmpeg`/`ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg_program: String,
    ffprobe_program: String,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self {
            ffmpeg_program: DEFAULT_FFMPEG_PROGRAM.to_string(),
            ffprobe_program: DEFAULT_FFPROBE_PROGRAM.to_string(),
        }
    }
}

impl FfmpegTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the executable names, e.g. for vendored builds.
    pub fn with_programs(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg_program: ffmpeg.into(),
            ffprobe_program: ffprobe.into(),
        }
    }

    /// Copy all streams from `input` to `output` unchanged, attaching one
    /// format-scoped metadata tag. A failed run leaves no partial output
    /// behind.
    #[instrument(level = "debug", skip(self, value, extra_output_args))]
    pub fn copy_with_tag(
        &self,
        input: &Path,
        output: &Path,
        key: &str,
        value: &str,
        extra_output_args: &[String],
    ) -> Result<()> {
        let mut command = Command::new(&self.ffmpeg_program);
        command
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-map", "0", "-c", "copy"])
            .arg("-metadata")
            .arg(format!("{key}={value}"));
        for arg in extra_output_args {
            command.arg(arg);
        }
        command.arg(output);

        self.run_ffmpeg(command, output)
    }

    /// Run a processing pass with caller-supplied output arguments; streams
    /// are copied when no arguments are given.
    #[instrument(level = "debug", skip(self, output_args))]
    pub fn transcode(&self, input: &Path, output: &Path, output_args: &[String]) -> Result<()> {
        let mut command = Command::new(&self.ffmpeg_program);
        command.arg("-y").arg("-i").arg(input);
        if output_args.is_empty() {
            command.args(["-c", "copy"]);
        }
        for arg in output_args {
            command.arg(arg);
        }
        command.arg(output);

        self.run_ffmpeg(command, output)
    }

    /// Probe `path` for format-level and stream-level tag maps.
    #[instrument(level = "debug", skip(self))]
    pub fn probe_tags(&self, path: &Path) -> Result<ContainerTags> {
        let output = Command::new(&self.ffprobe_program)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                AvcfError::Container(format!("failed to run {}: {e}", self.ffprobe_program))
            })?;

        if !output.status.success() {
            return Err(AvcfError::Container(format!(
                "{} failed: {}",
                self.ffprobe_program,
                stderr_tail(&output)
            )));
        }
        parse_probe_output(&output.stdout)
    }

    fn run_ffmpeg(&self, mut command: Command, output_path: &Path) -> Result<()> {
        let output = command.stdin(Stdio::null()).output().map_err(|e| {
            AvcfError::Container(format!("failed to run {}: {e}", self.ffmpeg_program))
        })?;

        if !output.status.success() {
            // A half-written container must not survive the failure.
            if output_path.exists() {
                if let Err(e) = std::fs::remove_file(output_path) {
                    warn!(path = %output_path.display(), error = %e, "Failed to remove partial output");
                }
            }
            return Err(AvcfError::Container(format!(
                "{} failed: {}",
                self.ffmpeg_program,
                stderr_tail(&output)
            )));
        }

        debug!(output = %output_path.display(), "ffmpeg run complete");
        Ok(())
    }
}

fn parse_probe_output(raw: &[u8]) -> Result<ContainerTags> {
    let probe: ProbeOutput = serde_json::from_slice(raw)
        .map_err(|e| AvcfError::Container(format!("failed to parse ffprobe output: {e}")))?;
    Ok(ContainerTags {
        format_tags: probe.format.tags,
        stream_tags: probe.streams.into_iter().map(|s| s.tags).collect(),
    })
}

/// ffmpeg is chatty; the last stderr lines carry the actual failure.
fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut lines: Vec<&str> = stderr.trim().lines().rev().take(4).collect();
    lines.reverse();
    lines.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_full() {
        let raw = br#"{
            "streams": [
                {"index": 0, "codec_type": "video", "tags": {"language": "und"}},
                {"index": 1, "codec_type": "audio", "tags": {"AVCF_AUTH": "{}"}}
            ],
            "format": {
                "filename": "x.mkv",
                "tags": {"ENCODER": "Lavf61", "AVCF_AUTH": "{\"a\":1}"}
            }
        }"#;
        let tags = parse_probe_output(raw).unwrap();
        assert_eq!(tags.stream_tags.len(), 2);
        assert_eq!(tags.stream_tags[1].get("AVCF_AUTH").unwrap(), "{}");
        assert_eq!(tags.format_tags.get("ENCODER").unwrap(), "Lavf61");
    }

    #[test]
    fn test_parse_probe_output_without_tags() {
        let raw = br#"{"streams": [{"index": 0}], "format": {"filename": "x.mp4"}}"#;
        let tags = parse_probe_output(raw).unwrap();
        assert!(tags.format_tags.is_empty());
        assert_eq!(tags.stream_tags.len(), 1);
        assert!(tags.stream_tags[0].is_empty());
    }

    #[test]
    fn test_parse_probe_output_empty_object() {
        let tags = parse_probe_output(b"{}").unwrap();
        assert!(tags.format_tags.is_empty());
        assert!(tags.stream_tags.is_empty());
    }

    #[test]
    fn test_parse_probe_output_malformed() {
        assert!(parse_probe_output(b"not json").is_err());
    }
}
