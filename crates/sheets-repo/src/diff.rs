//! Flattened tree comparison and git's raw diff encoding.
//!
//! Trees are compared as flat `path -> blob` maps restricted to a glob.
//! A path that disappears while another appears with the same or similar
//! content is reported as a rename.

use std::collections::{BTreeMap, HashSet};

use similar::TextDiff;
use sheets_store::BlobRef;
use sheets_types::ObjectId;

use crate::pathspec::PathGlob;

/// Minimum similarity, in percent, for a delete/add pair to be a rename.
pub const RENAME_THRESHOLD: u8 = 50;

/// Status of a single changed path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
    /// Moved, with the content similarity in percent.
    Renamed(u8),
}

impl ChangeKind {
    pub fn letter(&self) -> char {
        match self {
            Self::Added => 'A',
            Self::Deleted => 'D',
            Self::Modified => 'M',
            Self::Renamed(_) => 'R',
        }
    }
}

/// One change between two flattened trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeChange {
    pub kind: ChangeKind,
    /// Path in the source tree (or the destination path for additions).
    pub path: String,
    /// Destination path of a rename.
    pub new_path: Option<String>,
    pub src: Option<BlobRef>,
    pub dst: Option<BlobRef>,
}

/// Line-based similarity of two blobs, in percent.
///
/// Content that is not UTF-8 is only similar to identical content.
pub fn content_similarity(old: &[u8], new: &[u8]) -> u8 {
    match (std::str::from_utf8(old), std::str::from_utf8(new)) {
        (Ok(a), Ok(b)) => (TextDiff::from_lines(a, b).ratio() * 100.0).round() as u8,
        _ if old == new => 100,
        _ => 0,
    }
}

/// Compare two flattened trees, keeping only paths that match `glob`.
///
/// Deleted paths are paired with added ones first by identical content,
/// then by the best `similarity` at or above [`RENAME_THRESHOLD`].
/// Changes are ordered by source path.
pub fn diff_blob_maps<E>(
    old: &BTreeMap<String, BlobRef>,
    new: &BTreeMap<String, BlobRef>,
    glob: &PathGlob,
    mut similarity: impl FnMut(&BlobRef, &BlobRef) -> Result<u8, E>,
) -> Result<Vec<TreeChange>, E> {
    let selected = |path: &str| glob.matches(path);
    let mut changes = Vec::new();
    let mut deleted = Vec::new();
    let mut added = Vec::new();

    for (path, src) in old.iter().filter(|(p, _)| selected(p)) {
        match new.get(path) {
            Some(dst) if dst.id != src.id || dst.mode != src.mode => changes.push(TreeChange {
                kind: ChangeKind::Modified,
                path: path.clone(),
                new_path: None,
                src: Some(*src),
                dst: Some(*dst),
            }),
            Some(_) => {}
            None => deleted.push((path, *src)),
        }
    }
    for (path, dst) in new.iter().filter(|(p, _)| selected(p)) {
        if !old.contains_key(path) {
            added.push((path, *dst));
        }
    }

    let mut matched_adds = HashSet::new();
    let mut pairs: Vec<Option<(usize, u8)>> = vec![None; deleted.len()];

    for (di, (_, src)) in deleted.iter().enumerate() {
        let exact = added
            .iter()
            .enumerate()
            .find(|(ai, (_, dst))| dst.id == src.id && !matched_adds.contains(ai));
        if let Some((ai, _)) = exact {
            matched_adds.insert(ai);
            pairs[di] = Some((ai, 100));
        }
    }
    for (di, (_, src)) in deleted.iter().enumerate() {
        if pairs[di].is_some() {
            continue;
        }
        let mut best: Option<(usize, u8)> = None;
        for (ai, (_, dst)) in added.iter().enumerate() {
            if matched_adds.contains(&ai) {
                continue;
            }
            let score = similarity(src, dst)?;
            if score >= RENAME_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
                best = Some((ai, score));
            }
        }
        if let Some((ai, score)) = best {
            matched_adds.insert(ai);
            pairs[di] = Some((ai, score));
        }
    }

    for ((old_path, src), pair) in deleted.into_iter().zip(pairs) {
        match pair {
            Some((ai, score)) => {
                let (new_path, dst) = &added[ai];
                changes.push(TreeChange {
                    kind: ChangeKind::Renamed(score),
                    path: old_path.clone(),
                    new_path: Some((*new_path).clone()),
                    src: Some(src),
                    dst: Some(*dst),
                });
            }
            None => changes.push(TreeChange {
                kind: ChangeKind::Deleted,
                path: old_path.clone(),
                new_path: None,
                src: Some(src),
                dst: None,
            }),
        }
    }
    for (ai, (path, dst)) in added.into_iter().enumerate() {
        if !matched_adds.contains(&ai) {
            changes.push(TreeChange {
                kind: ChangeKind::Added,
                path: path.clone(),
                new_path: None,
                src: None,
                dst: Some(dst),
            });
        }
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(changes)
}

fn side(blob: Option<&BlobRef>) -> (String, String) {
    match blob {
        Some(b) => (b.mode.to_string(), b.id.to_hex()),
        None => ("000000".to_string(), ObjectId::null().to_hex()),
    }
}

/// Encode changes in git's `diff-tree --raw -z` layout:
/// `:<srcMode> <dstMode> <srcHash> <dstHash> <status>\0<path>\0[<newPath>\0]`.
pub fn encode_raw_diff(changes: &[TreeChange]) -> Vec<u8> {
    let mut out = Vec::new();
    for change in changes {
        let (src_mode, src_hash) = side(change.src.as_ref());
        let (dst_mode, dst_hash) = side(change.dst.as_ref());
        let status = match change.kind {
            ChangeKind::Renamed(score) => format!("R{score:03}"),
            kind => kind.letter().to_string(),
        };
        out.extend_from_slice(
            format!(":{src_mode} {dst_mode} {src_hash} {dst_hash} {status}").as_bytes(),
        );
        out.push(0);
        out.extend_from_slice(change.path.as_bytes());
        out.push(0);
        if let Some(new_path) = &change.new_path {
            out.extend_from_slice(new_path.as_bytes());
            out.push(0);
        }
    }
    out
}
