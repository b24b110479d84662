//! Crash recovery and autosave.
//!
//! On every cold start the [`RecoveryManager`] checks whether an unsynced
//! history record was left behind, offers it back to the user, and then
//! keeps autosaving the editor text under the same record.
//!
//! ```text
//! Idle ──on_initial_file_load──▶ Checking ──no record / empty──▶ Autosaving
//!                                   │                              ▲
//!                                   └──record──▶ Prompting ──yes/no┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use ts_rs::TS;

mod manager;

pub use manager::RecoveryManager;

/// Where the manager is in its start-up sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPhase {
    /// Waiting for the first document to load.
    Idle,
    /// Looking for an unsynced record.
    Checking,
    /// Waiting for the user to answer the restore prompt.
    Prompting,
    /// Start-up check done; autosave triggers are live.
    Autosaving,
}

/// Result of the start-up check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub enum RecoveryOutcome {
    /// No unsynced record was stored.
    NoRecord,
    /// A record was stored but held no real edits.
    EmptyRecord,
    /// The user restored the record into the editor.
    Restored,
    /// The user declined or dismissed the prompt; the record was removed.
    Discarded,
    /// The check already ran in this process.
    AlreadyChecked,
}

/// Per-process recovery bookkeeping. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryState {
    /// Whether the user has answered the restore prompt this session.
    pub has_prompted_recovery: bool,

    /// When the last autosave succeeded.
    pub last_autosave: Option<DateTime<Utc>>,
}

impl RecoveryState {
    /// Whether an idle notification at `now` should trigger a save.
    ///
    /// Saves once the prompt has been answered, before the first save, or
    /// once `min_interval` has passed since the last one.
    pub fn should_idle_save(&self, now: DateTime<Utc>, min_interval: Duration) -> bool {
        if self.has_prompted_recovery {
            return true;
        }
        match self.last_autosave {
            None => true,
            Some(last) => now - last >= min_interval,
        }
    }
}
