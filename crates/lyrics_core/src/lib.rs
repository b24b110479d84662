#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Configuration options
pub mod config;

/// Error (common error types)
pub mod error;

/// Character-level diff and best-effort patch application
pub mod diff;

/// History ledger (append-only patch log of the lyrics text)
pub mod history;

/// Versioned extension protocol (capsules, version dispatch, extensions)
pub mod extension;

/// Save containers (rich zip container and plain text)
pub mod container;

/// Open document (wires extensions into containers)
pub mod session;

/// Crash recovery and autosave
pub mod recovery;

/// Key-value app data store
pub mod app_data;

/// Named-event message transport
pub mod transport;

/// Clock and timestamp formatting
pub mod clock;

/// Filesystem abstraction
pub mod fs;

#[cfg(test)]
pub mod test_utils;
