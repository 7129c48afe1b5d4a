//! Parsing raw tree diffs into per-record change entries.

use serde::Serialize;
use sheets_codec::Record;
use sheets_store::{BlobRef, EntryMode};
use sheets_types::ObjectId;

use crate::error::{SheetError, SheetResult};
use crate::patch::PatchOp;

/// Status of a record between two trees. Renames surface as `Modified`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Added,
    Deleted,
    Modified,
}

/// One line of raw diff output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDiffLine {
    pub src_mode: u32,
    pub dst_mode: u32,
    pub src_hash: Option<ObjectId>,
    pub dst_hash: Option<ObjectId>,
    /// Status letter: `A`, `D`, `M` or `R`.
    pub status: char,
    /// Similarity score following the status letter, if any.
    pub score: Option<u32>,
    pub path: String,
    /// Destination path of a rename or copy.
    pub new_path: Option<String>,
}

impl RawDiffLine {
    pub fn diff_status(&self) -> SheetResult<DiffStatus> {
        match self.status {
            'A' => Ok(DiffStatus::Added),
            'D' => Ok(DiffStatus::Deleted),
            'M' | 'R' => Ok(DiffStatus::Modified),
            other => Err(SheetError::MalformedDiff(format!(
                "unsupported status {other:?} for {}",
                self.path
            ))),
        }
    }

    pub fn src_blob(&self) -> Option<BlobRef> {
        blob_ref(self.src_hash, self.src_mode)
    }

    pub fn dst_blob(&self) -> Option<BlobRef> {
        blob_ref(self.dst_hash, self.dst_mode)
    }
}

fn blob_ref(hash: Option<ObjectId>, mode: u32) -> Option<BlobRef> {
    hash.map(|id| BlobRef {
        id,
        mode: EntryMode::from_mode_bits(mode).unwrap_or(EntryMode::Regular),
    })
}

/// Parse NUL-delimited raw diff output:
/// `:<srcMode> <dstMode> <srcHash> <dstHash> <status>[score]\0<path>\0[<newPath>\0]`.
pub fn parse_raw_diff(raw: &[u8]) -> SheetResult<Vec<RawDiffLine>> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| SheetError::MalformedDiff(format!("diff is not utf-8: {e}")))?;
    let mut tokens = text.split('\0').filter(|t| !t.is_empty());
    let mut lines = Vec::new();

    while let Some(header) = tokens.next() {
        let fields = header
            .strip_prefix(':')
            .ok_or_else(|| SheetError::MalformedDiff(format!("expected header, got {header:?}")))?;
        let parts: Vec<&str> = fields.split(' ').collect();
        let [src_mode, dst_mode, src_hash, dst_hash, status] = parts[..] else {
            return Err(SheetError::MalformedDiff(format!("bad header {header:?}")));
        };

        let mut status_chars = status.chars();
        let letter = status_chars
            .next()
            .ok_or_else(|| SheetError::MalformedDiff(format!("missing status in {header:?}")))?;
        let score = match status_chars.as_str() {
            "" => None,
            digits => Some(digits.parse::<u32>().map_err(|_| {
                SheetError::MalformedDiff(format!("bad score in {header:?}"))
            })?),
        };

        let path = tokens
            .next()
            .ok_or_else(|| SheetError::MalformedDiff(format!("missing path after {header:?}")))?
            .to_string();
        let new_path = match letter {
            'R' | 'C' => Some(
                tokens
                    .next()
                    .ok_or_else(|| {
                        SheetError::MalformedDiff(format!("missing new path for {path:?}"))
                    })?
                    .to_string(),
            ),
            _ => None,
        };

        lines.push(RawDiffLine {
            src_mode: parse_mode(src_mode)?,
            dst_mode: parse_mode(dst_mode)?,
            src_hash: parse_hash(src_hash)?,
            dst_hash: parse_hash(dst_hash)?,
            status: letter,
            score,
            path,
            new_path,
        });
    }
    Ok(lines)
}

fn parse_mode(text: &str) -> SheetResult<u32> {
    u32::from_str_radix(text, 8)
        .map_err(|_| SheetError::MalformedDiff(format!("bad mode {text:?}")))
}

fn parse_hash(text: &str) -> SheetResult<Option<ObjectId>> {
    let id: ObjectId = text
        .parse()
        .map_err(|_| SheetError::MalformedDiff(format!("bad hash {text:?}")))?;
    Ok((!id.is_null()).then_some(id))
}

/// What to attach to each diff entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffOptions {
    pub blobs: bool,
    pub records: bool,
    pub patches: bool,
}

impl DiffOptions {
    /// Blob references, decoded records and patches.
    pub fn full() -> Self {
        Self {
            blobs: true,
            records: true,
            patches: true,
        }
    }
}

/// A record changed between two trees.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiffEntry {
    /// Record path relative to the sheet root, without extension.
    pub path: String,
    /// Path the record had before a rename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    pub status: DiffStatus,
    #[serde(skip)]
    pub src_blob: Option<BlobRef>,
    #[serde(skip)]
    pub dst_blob: Option<BlobRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Vec<PatchOp>>,
}
