//! Character-level diff and patch engine.
//!
//! [`diff`] turns two text states into a [`PatchSet`]; [`apply`] replays a
//! patch set onto a base string. Applying a patch set to the exact base it
//! was computed from reproduces the target text exactly. Applying it to any
//! other base never panics: each patch is searched for near its expected
//! position and skipped if its source text cannot be found.
//!
//! Offsets are counted in `char`s so multi-byte text never splits a code point.
//!
//! # Example
//!
//! ```
//! use lyrics_core::diff::{apply, diff};
//!
//! let patches = diff("Row your boat", "Row, row your boat");
//! assert_eq!(apply("Row your boat", &patches), "Row, row your boat");
//! ```

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

/// Unchanged characters kept on either side of an edit.
///
/// The context lets a patch find its position again when it is replayed on
/// a base that drifted from the one it was computed against.
pub const CONTEXT_MARGIN: usize = 4;

/// One run of characters inside a [`Patch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    /// Text present in both the source and the target.
    Equal(String),
    /// Text removed from the source.
    Delete(String),
    /// Text added in the target.
    Insert(String),
}

impl Segment {
    fn text(&self) -> &str {
        match self {
            Segment::Equal(text) | Segment::Delete(text) | Segment::Insert(text) => text,
        }
    }
}

/// A single localized edit: where it starts in the source text and the
/// segments (context included) that describe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Char offset in the source text where the first segment begins.
    pub start: usize,
    /// Ordered segments covering the edit and its context.
    pub segments: Vec<Segment>,
}

/// All patches needed to turn one text state into the next, in source order.
pub type PatchSet = Vec<Patch>;

impl Patch {
    /// Characters this patch expects to find in the source.
    fn source(&self) -> Vec<char> {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Insert(_)))
            .flat_map(|s| s.text().chars())
            .collect()
    }

    /// Characters this patch leaves in place of its source.
    fn target(&self) -> Vec<char> {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Delete(_)))
            .flat_map(|s| s.text().chars())
            .collect()
    }

    /// Whether the patch changes anything at all.
    pub fn has_changes(&self) -> bool {
        self.segments
            .iter()
            .any(|s| !matches!(s, Segment::Equal(_)) && !s.text().is_empty())
    }
}

/// Compute the patch set turning `old` into `new`.
///
/// Identical inputs produce an empty patch set.
pub fn diff(old: &str, new: &str) -> PatchSet {
    if old == new {
        return Vec::new();
    }

    let text_diff = TextDiff::from_chars(old, new);
    let mut patches = Vec::new();

    for group in text_diff.grouped_ops(CONTEXT_MARGIN) {
        let start = match group.first() {
            Some(op) => op.old_range().start,
            None => continue,
        };

        let mut segments: Vec<Segment> = Vec::new();
        for op in &group {
            for change in text_diff.iter_changes(op) {
                push_change(&mut segments, change.tag(), change.value());
            }
        }

        let patch = Patch { start, segments };
        if patch.has_changes() {
            patches.push(patch);
        }
    }

    patches
}

/// Append a change to the segment list, merging with the previous segment
/// when it has the same kind.
fn push_change(segments: &mut Vec<Segment>, tag: ChangeTag, value: &str) {
    match (segments.last_mut(), tag) {
        (Some(Segment::Equal(text)), ChangeTag::Equal)
        | (Some(Segment::Delete(text)), ChangeTag::Delete)
        | (Some(Segment::Insert(text)), ChangeTag::Insert) => text.push_str(value),
        (_, ChangeTag::Equal) => segments.push(Segment::Equal(value.to_string())),
        (_, ChangeTag::Delete) => segments.push(Segment::Delete(value.to_string())),
        (_, ChangeTag::Insert) => segments.push(Segment::Insert(value.to_string())),
    }
}

/// Apply a patch set to `base`, returning the patched text.
///
/// Patches that cannot be located are skipped.
pub fn apply(base: &str, patches: &[Patch]) -> String {
    apply_with_report(base, patches).0
}

/// Apply a patch set to `base`, also reporting which patches were applied.
///
/// The returned flags are in the same order as `patches`.
pub fn apply_with_report(base: &str, patches: &[Patch]) -> (String, Vec<bool>) {
    let mut text: Vec<char> = base.chars().collect();
    let mut applied = Vec::with_capacity(patches.len());
    // Difference between where patches were computed to land and where
    // they actually land after earlier patches grew or shrank the text.
    let mut drift: isize = 0;

    for patch in patches {
        let source = patch.source();
        let target = patch.target();
        // A start past isize::MAX cannot address any real text.
        let Some(start) = isize::try_from(patch.start).ok() else {
            log::debug!("Skipping patch at {}: start out of range", patch.start);
            applied.push(false);
            continue;
        };
        let expected = start.saturating_add(drift).max(0) as usize;

        match locate(&text, &source, expected) {
            Some(position) => {
                text.splice(position..position + source.len(), target.iter().copied());
                drift = (position as isize - start)
                    .saturating_add(target.len() as isize - source.len() as isize);
                applied.push(true);
            }
            None => {
                log::debug!(
                    "Skipping patch at {}: source text not found in base",
                    patch.start
                );
                applied.push(false);
            }
        }
    }

    (text.into_iter().collect(), applied)
}

/// Find where `source` sits in `text`, preferring `expected` and otherwise
/// the closest exact occurrence.
fn locate(text: &[char], source: &[char], expected: usize) -> Option<usize> {
    if source.is_empty() {
        return Some(expected.min(text.len()));
    }
    if source.len() > text.len() {
        return None;
    }

    if expected <= text.len() - source.len()
        && text[expected..expected + source.len()] == *source
    {
        return Some(expected);
    }

    text.windows(source.len())
        .enumerate()
        .filter(|(_, window)| *window == source)
        .map(|(index, _)| index)
        .min_by_key(|index| index.abs_diff(expected))
}
