//! Append-only edit history for a document.
//!
//! The [`HistoryLedger`] records one [`HistoryEntry`] per accepted edit. Each
//! entry holds the patch set that turns the previous text into the new one,
//! so replaying every entry from the empty string rebuilds the latest text
//! and replaying a prefix rebuilds any earlier state.
//!
//! # Example
//!
//! ```
//! use lyrics_core::history::HistoryLedger;
//!
//! let mut ledger = HistoryLedger::new();
//! ledger.add("Row");
//! ledger.add("Row your boat");
//!
//! let capsule = ledger.serialize();
//! let mut restored = HistoryLedger::restored(&capsule);
//! assert_eq!(restored.full_text(), "Row your boat");
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::clock::{Clock, SystemClock};
use crate::diff::{self, PatchSet};
use crate::extension::{self, CapsuleError, FormatVersion, VersionedCapsule};

/// On-disk versions of the serialized entry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFormat {
    /// JSON array of `{timestamp, patchSet}` objects.
    V1,
}

impl FormatVersion for HistoryFormat {
    const CURRENT: Self = HistoryFormat::V1;

    fn from_number(number: u32) -> Option<Self> {
        match number {
            1 => Some(HistoryFormat::V1),
            _ => None,
        }
    }

    fn number(self) -> u32 {
        match self {
            HistoryFormat::V1 => 1,
        }
    }
}

/// One accepted edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Unix timestamp (milliseconds)
    pub timestamp: i64,

    /// Patches turning the previous text into this entry's text
    pub patch_set: PatchSet,
}

/// The document text as it was after one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HistorySnapshot {
    /// Unix timestamp (milliseconds) of the entry
    pub timestamp: i64,

    /// Full text after applying the entry
    pub text: String,
}

/// Ordered, append-only sequence of history entries.
pub struct HistoryLedger {
    entries: Vec<HistoryEntry>,
    /// Result of replaying every entry. `None` after a load until the next
    /// reconstruction.
    last_known_text: Option<String>,
    clock: Arc<dyn Clock>,
}

impl HistoryLedger {
    /// Create an empty ledger using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty ledger stamping entries from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Vec::new(),
            last_known_text: Some(String::new()),
            clock,
        }
    }

    /// Build a ledger from a serialized capsule.
    pub fn restored(capsule: &VersionedCapsule<String>) -> Self {
        let mut ledger = Self::new();
        ledger.deserialize(capsule);
        ledger
    }

    /// An empty ledger sharing this ledger's clock.
    pub fn fresh(&self) -> Self {
        Self::with_clock(Arc::clone(&self.clock))
    }

    /// Record `text` as the next state.
    ///
    /// Blank text and text equal to the current state are ignored. Returns
    /// whether an entry was appended.
    pub fn add(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        let last = self.full_text();
        if text == last {
            return false;
        }

        let patch_set = diff::diff(&last, text);
        self.entries.push(HistoryEntry {
            timestamp: self.clock.now_millis(),
            patch_set,
        });
        self.last_known_text = Some(text.to_string());
        true
    }

    /// Capture any unflushed edit right before the ledger is serialized.
    pub fn capture_before_serialize(&mut self, current_text: &str) -> bool {
        self.add(current_text)
    }

    /// Serialize the entry sequence into a capsule tagged with the current format.
    pub fn serialize(&self) -> VersionedCapsule<String> {
        // Entries are plain strings and integers; encoding cannot fail.
        let payload = serde_json::to_string(&self.entries).unwrap_or_else(|_| "[]".to_string());
        VersionedCapsule::new(HistoryFormat::CURRENT.number(), payload)
    }

    /// Replace the ledger's entries with the capsule's.
    ///
    /// Unknown versions and unreadable payloads leave the ledger empty.
    pub fn deserialize(&mut self, capsule: &VersionedCapsule<String>) {
        self.entries = parse_entries(capsule);
        self.last_known_text = if self.entries.is_empty() {
            Some(String::new())
        } else {
            None
        };
    }

    /// Whether the capsule holds at least one entry that changes the text.
    pub fn is_non_empty_history(capsule: &VersionedCapsule<String>) -> bool {
        has_changes(&parse_entries(capsule))
    }

    /// Whether this ledger holds at least one entry that changes the text.
    pub fn has_changes(&self) -> bool {
        has_changes(&self.entries)
    }

    /// The latest text, rebuilding it from the entries if needed.
    pub fn full_text(&mut self) -> String {
        if let Some(text) = &self.last_known_text {
            return text.clone();
        }

        let text = self
            .entries
            .iter()
            .fold(String::new(), |base, entry| diff::apply(&base, &entry.patch_set));
        self.last_known_text = Some(text.clone());
        text
    }

    /// Every intermediate state, oldest first.
    pub fn incremental_history(&self) -> Vec<HistorySnapshot> {
        let mut snapshots = Vec::with_capacity(self.entries.len());
        let mut text = String::new();
        for entry in &self.entries {
            text = diff::apply(&text, &entry.patch_set);
            snapshots.push(HistorySnapshot {
                timestamp: entry.timestamp,
                text: text.clone(),
            });
        }
        snapshots
    }

    /// The text after replaying the first `index + 1` entries.
    pub fn text_at(&self, index: usize) -> Option<String> {
        if index >= self.entries.len() {
            return None;
        }
        Some(
            self.entries[..=index]
                .iter()
                .fold(String::new(), |base, entry| diff::apply(&base, &entry.patch_set)),
        )
    }

    /// Recorded entries, oldest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_entries(capsule: &VersionedCapsule<String>) -> Vec<HistoryEntry> {
    extension::dispatch(
        capsule,
        |version: HistoryFormat, payload: &String| match version {
            HistoryFormat::V1 => serde_json::from_str::<Vec<HistoryEntry>>(payload)
                .map_err(CapsuleError::from),
        },
        Vec::new,
    )
}

fn has_changes(entries: &[HistoryEntry]) -> bool {
    entries.iter().any(|entry| !entry.patch_set.is_empty())
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HistoryLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryLedger")
            .field("entries", &self.entries.len())
            .field("cached", &self.last_known_text.is_some())
            .finish()
    }
}
