use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

/// Unified error type for lyrics_core operations
#[derive(Debug, Error)]
pub enum LyricsError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Container errors
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Incompatible file: {0}")]
    IncompatibleFile(String),

    #[error(
        "Unsupported file format version {version}. The file was created with version {created_with}; update the app to open it."
    )]
    UnsupportedVersion { version: i64, created_with: String },

    #[error("No handler can open '{0}'")]
    NoHandler(String),

    // AppData errors
    #[error("App data error for key '{key}': {message}")]
    AppData { key: String, message: String },

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias for lyrics_core operations
pub type Result<T> = std::result::Result<T, LyricsError>;

/// A serializable representation of LyricsError for IPC
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&LyricsError> for SerializableError {
    fn from(err: &LyricsError) -> Self {
        let kind = match err {
            LyricsError::Io(_) => "Io",
            LyricsError::FileRead { .. } => "FileRead",
            LyricsError::FileWrite { .. } => "FileWrite",
            LyricsError::Archive(_) => "Archive",
            LyricsError::Json(_) => "Json",
            LyricsError::IncompatibleFile(_) => "IncompatibleFile",
            LyricsError::UnsupportedVersion { .. } => "UnsupportedVersion",
            LyricsError::NoHandler(_) => "NoHandler",
            LyricsError::AppData { .. } => "AppData",
            LyricsError::ConfigParse(_) => "ConfigParse",
            LyricsError::ConfigSerialize(_) => "ConfigSerialize",
            LyricsError::NoConfigDir => "NoConfigDir",
        }
        .to_string();

        let path = match err {
            LyricsError::FileRead { path, .. } => Some(path.clone()),
            LyricsError::FileWrite { path, .. } => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<LyricsError> for SerializableError {
    fn from(err: LyricsError) -> Self {
        SerializableError::from(&err)
    }
}

impl LyricsError {
    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }

    /// Whether this error means the file itself cannot be opened by this build,
    /// as opposed to an I/O problem reading it.
    pub fn is_incompatible(&self) -> bool {
        matches!(
            self,
            LyricsError::IncompatibleFile(_) | LyricsError::UnsupportedVersion { .. }
        )
    }
}
