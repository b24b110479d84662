//! Versioned extension protocol.
//!
//! Auxiliary document state travels inside a save file as a
//! [`VersionedCapsule`]: an optional format version plus an optional
//! payload. Readers never fail on a capsule. [`dispatch`] routes a capsule to
//! the handler for its version and falls back to a default when the version
//! is unknown, the payload is missing, or the handler rejects the payload.
//!
//! Each kind of auxiliary state implements [`Extension`] and is identified by
//! an [`ExtensionKey`]. A document owns exactly one live instance of every
//! extension through [`Extensions`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::HistoryLedger;

/// A versioned envelope around a serialized payload.
///
/// A capsule with no version has never been saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedCapsule<T> {
    /// Format version the payload was written with.
    #[serde(default)]
    pub version: Option<u32>,
    /// The serialized state.
    #[serde(default)]
    pub payload: Option<T>,
}

impl<T> VersionedCapsule<T> {
    /// A capsule tagged with `version`.
    pub fn new(version: u32, payload: T) -> Self {
        Self {
            version: Some(version),
            payload: Some(payload),
        }
    }

    /// A capsule carrying nothing.
    pub fn empty() -> Self {
        Self {
            version: None,
            payload: None,
        }
    }
}

impl<T> Default for VersionedCapsule<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Why a version handler rejected a capsule payload.
#[derive(Debug, Error)]
pub enum CapsuleError {
    /// The payload did not parse.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload parsed but broke an invariant of its format.
    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// A closed set of on-disk format versions.
pub trait FormatVersion: Copy + fmt::Debug {
    /// The version written by this build.
    const CURRENT: Self;

    /// Map a stored version number to a known version.
    fn from_number(number: u32) -> Option<Self>;

    /// The number stored on disk for this version.
    fn number(self) -> u32;
}

/// Route `capsule` to the handler for its version.
///
/// `handle` runs only when the version is recognised and a payload is
/// present. If it returns an error, a warning naming the capsule is logged
/// and `invalid` provides the result instead. Unknown or absent versions go
/// straight to `invalid`.
pub fn dispatch<V, P, T>(
    capsule: &VersionedCapsule<P>,
    handle: impl FnOnce(V, &P) -> Result<T, CapsuleError>,
    invalid: impl FnOnce() -> T,
) -> T
where
    V: FormatVersion,
    P: fmt::Debug,
{
    let version = capsule.version.and_then(V::from_number);

    match (version, capsule.payload.as_ref()) {
        (Some(version), Some(payload)) => match handle(version, payload) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Discarding capsule with {:?} payload ({}): {:?}", version, e, capsule);
                invalid()
            }
        },
        _ => {
            log::debug!("No handler for capsule version {:?}", capsule.version);
            invalid()
        }
    }
}

/// Encode a capsule as extension payload bytes.
pub fn encode_capsule(capsule: &VersionedCapsule<String>) -> Vec<u8> {
    // A struct of two optional primitives always serializes.
    serde_json::to_vec(capsule).unwrap_or_default()
}

/// Decode extension payload bytes, degrading to an empty capsule.
pub fn decode_capsule(bytes: &[u8]) -> VersionedCapsule<String> {
    match serde_json::from_slice(bytes) {
        Ok(capsule) => capsule,
        Err(e) => {
            log::warn!(
                "Undecodable extension payload ({}): {}",
                e,
                String::from_utf8_lossy(bytes)
            );
            VersionedCapsule::empty()
        }
    }
}

/// Identifies a kind of extension state inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionKey {
    /// The document's edit history.
    History,
}

impl ExtensionKey {
    /// Every known key.
    pub const ALL: [ExtensionKey; 1] = [ExtensionKey::History];

    /// Name used in storage (container entry names).
    pub fn as_str(self) -> &'static str {
        match self {
            ExtensionKey::History => "history",
        }
    }

    /// Look up a key by its storage name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

impl fmt::Display for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Auxiliary document state that can ride along in a save file.
pub trait Extension {
    /// Which extension this is.
    fn key(&self) -> ExtensionKey;

    /// Capture the current state.
    fn serialize(&self) -> VersionedCapsule<String>;

    /// Replace the current state with the capsule's. Must not fail: an
    /// unreadable capsule resets the extension.
    fn deserialize(&mut self, capsule: &VersionedCapsule<String>);

    /// Return to the state of a freshly opened document.
    fn reset(&mut self) {}

    /// Called with the document text right before [`Extension::serialize`]
    /// during a save.
    fn on_before_capture(&mut self, _current_text: &str) {}
}

/// The history ledger as a document extension.
#[derive(Debug, Default)]
pub struct HistoryExtension {
    ledger: HistoryLedger,
}

impl HistoryExtension {
    /// Wrap an existing ledger.
    pub fn new(ledger: HistoryLedger) -> Self {
        Self { ledger }
    }

    /// The wrapped ledger.
    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// The wrapped ledger, mutably.
    pub fn ledger_mut(&mut self) -> &mut HistoryLedger {
        &mut self.ledger
    }
}

impl Extension for HistoryExtension {
    fn key(&self) -> ExtensionKey {
        ExtensionKey::History
    }

    fn serialize(&self) -> VersionedCapsule<String> {
        self.ledger.serialize()
    }

    fn deserialize(&mut self, capsule: &VersionedCapsule<String>) {
        self.ledger.deserialize(capsule);
    }

    fn reset(&mut self) {
        self.ledger = self.ledger.fresh();
    }

    fn on_before_capture(&mut self, current_text: &str) {
        self.ledger.capture_before_serialize(current_text);
    }
}

/// One live instance of every extension, owned by an open document.
#[derive(Debug, Default)]
pub struct Extensions {
    history: HistoryExtension,
}

impl Extensions {
    /// Create the extension set around an existing history ledger.
    pub fn with_history(ledger: HistoryLedger) -> Self {
        Self {
            history: HistoryExtension::new(ledger),
        }
    }

    /// The extension registered under `key`.
    pub fn get(&self, key: ExtensionKey) -> &dyn Extension {
        match key {
            ExtensionKey::History => &self.history,
        }
    }

    /// The extension registered under `key`, mutably.
    pub fn get_mut(&mut self, key: ExtensionKey) -> &mut dyn Extension {
        match key {
            ExtensionKey::History => &mut self.history,
        }
    }

    /// All extensions in key order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Extension> {
        ExtensionKey::ALL.into_iter().map(|key| self.get(key))
    }

    /// Run `f` on every extension in key order.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut dyn Extension)) {
        for key in ExtensionKey::ALL {
            f(self.get_mut(key));
        }
    }

    /// Reset every extension.
    pub fn reset_all(&mut self) {
        self.for_each_mut(|extension| extension.reset());
    }

    /// The history extension.
    pub fn history(&self) -> &HistoryExtension {
        &self.history
    }

    /// The history extension, mutably.
    pub fn history_mut(&mut self) -> &mut HistoryExtension {
        &mut self.history
    }
}
