//! Container adapters: per-format embed and extract of the signed block.
//!
//! Each adapter stores the block as one JSON string under a format-specific
//! tag key and reads it back via the probe facility. Format selection is by
//! file extension only.

use std::path::Path;

use tracing::{debug, instrument};

use crate::error::{AvcfError, Result};
use crate::ffmpeg::{ContainerTags, FfmpegTool};
use crate::model::SignedAvcfBlock;

/// Tag key used by the MP4 adapter.
pub const MP4_TAG_KEY: &str = "avcf_auth";
/// Tag key used by the Matroska family (ffmpeg uppercases Matroska tag
/// names on write).
pub const MATROSKA_TAG_KEY: &str = "AVCF_AUTH";

/// Without this muxer flag the mov muxer silently drops custom tag keys.
const MP4_EXTRA_OUTPUT_ARGS: [&str; 2] = ["-movflags", "use_metadata_tags"];

/// Embed/extract surface implemented once per container family.
pub trait ContainerAdapter: std::fmt::Debug {
    /// The metadata tag key this adapter reads and writes.
    fn tag_key(&self) -> &'static str;

    /// Copy `input` to `output` with the signed block attached as one tag.
    fn embed(&self, input: &Path, output: &Path, block: &SignedAvcfBlock) -> Result<()>;

    /// Pull the signed block back out of `path`, if present.
    fn extract(&self, path: &Path) -> Result<Option<SignedAvcfBlock>>;
}

#[derive(Debug)]
pub struct Mp4Adapter {
    tool: FfmpegTool,
}

impl Mp4Adapter {
    pub fn new(tool: FfmpegTool) -> Self {
        Self { tool }
    }
}

impl ContainerAdapter for Mp4Adapter {
    fn tag_key(&self) -> &'static str {
        MP4_TAG_KEY
    }

    #[instrument(level = "debug", skip(self, block))]
    fn embed(&self, input: &Path, output: &Path, block: &SignedAvcfBlock) -> Result<()> {
        let payload = block_to_tag_value(block)?;
        let extra: Vec<String> = MP4_EXTRA_OUTPUT_ARGS
            .iter()
            .map(|arg| (*arg).to_string())
            .collect();
        self.tool
            .copy_with_tag(input, output, MP4_TAG_KEY, &payload, &extra)
    }

    fn extract(&self, path: &Path) -> Result<Option<SignedAvcfBlock>> {
        let tags = self.tool.probe_tags(path)?;
        block_from_tags(&tags, MP4_TAG_KEY)
    }
}

#[derive(Debug)]
pub struct MatroskaAdapter {
    tool: FfmpegTool,
}

impl MatroskaAdapter {
    pub fn new(tool: FfmpegTool) -> Self {
        Self { tool }
    }
}

impl ContainerAdapter for MatroskaAdapter {
    fn tag_key(&self) -> &'static str {
        MATROSKA_TAG_KEY
    }

    #[instrument(level = "debug", skip(self, block))]
    fn embed(&self, input: &Path, output: &Path, block: &SignedAvcfBlock) -> Result<()> {
        let payload = block_to_tag_value(block)?;
        self.tool
            .copy_with_tag(input, output, MATROSKA_TAG_KEY, &payload, &[])
    }

    fn extract(&self, path: &Path) -> Result<Option<SignedAvcfBlock>> {
        let tags = self.tool.probe_tags(path)?;
        block_from_tags(&tags, MATROSKA_TAG_KEY)
    }
}

/// WebM is Matroska with a different extension; same tag key, same logic.
#[derive(Debug)]
pub struct WebmAdapter {
    inner: MatroskaAdapter,
}

impl WebmAdapter {
    pub fn new(tool: FfmpegTool) -> Self {
        Self {
            inner: MatroskaAdapter::new(tool),
        }
    }
}

impl ContainerAdapter for WebmAdapter {
    fn tag_key(&self) -> &'static str {
        self.inner.tag_key()
    }

    fn embed(&self, input: &Path, output: &Path, block: &SignedAvcfBlock) -> Result<()> {
        self.inner.embed(input, output, block)
    }

    fn extract(&self, path: &Path) -> Result<Option<SignedAvcfBlock>> {
        self.inner.extract(path)
    }
}

/// Select the adapter for a path, by extension alone.
pub fn adapter_for_path(path: &Path) -> Result<Box<dyn ContainerAdapter>> {
    adapter_with_tool(path, FfmpegTool::new())
}

pub fn adapter_with_tool(path: &Path, tool: FfmpegTool) -> Result<Box<dyn ContainerAdapter>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    debug!(path = %path.display(), %extension, "Selecting container adapter");

    match extension.as_str() {
        "mp4" => Ok(Box::new(Mp4Adapter::new(tool))),
        "mkv" => Ok(Box::new(MatroskaAdapter::new(tool))),
        "webm" => Ok(Box::new(WebmAdapter::new(tool))),
        "" => Err(AvcfError::Container(format!(
            "unsupported container format: {}",
            path.display()
        ))),
        other => Err(AvcfError::Container(format!(
            "unsupported container format: .{other}"
        ))),
    }
}

fn block_to_tag_value(block: &SignedAvcfBlock) -> Result<String> {
    serde_json::to_string(block)
        .map_err(|e| AvcfError::Container(format!("failed to serialize signed block: {e}")))
}

/// Stream-scoped tags win over format-scoped ones.
fn block_from_tags(tags: &ContainerTags, key: &str) -> Result<Option<SignedAvcfBlock>> {
    let hit = tags
        .stream_tags
        .iter()
        .find_map(|stream| stream.get(key))
        .or_else(|| tags.format_tags.get(key));

    match hit {
        Some(raw) => parse_tag_value(raw).map(Some),
        None => Ok(None),
    }
}

fn parse_tag_value(raw: &str) -> Result<SignedAvcfBlock> {
    serde_json::from_str(raw)
        .map_err(|e| AvcfError::Container(format!("malformed tag payload: {e}")))
}
