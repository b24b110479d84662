//! Save file formats.
//!
//! A saved document is a [`Container`]: the primary lyrics text, a
//! [`VersionDescriptor`] and zero or more extension payloads. Each on-disk
//! format is a [`FileHandler`]; the [`HandlerRegistry`] picks the first
//! handler that recognises a file.
//!
//! - [`RichContainerHandler`]: zip archive carrying text, version and extensions.
//! - [`PlainTextHandler`]: bare text, for files written by other tools.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::Result;
use crate::extension::{ExtensionKey, FormatVersion};

mod plain;
mod rich;

pub use plain::PlainTextHandler;
pub use rich::RichContainerHandler;

/// Known container layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// `lyrics.txt` + `version.json` + `extensions/<key>.dat`.
    V1,
}

impl FormatVersion for ContainerFormat {
    const CURRENT: Self = ContainerFormat::V1;

    fn from_number(number: u32) -> Option<Self> {
        match number {
            1 => Some(ContainerFormat::V1),
            _ => None,
        }
    }

    fn number(self) -> u32 {
        match self {
            ContainerFormat::V1 => 1,
        }
    }
}

/// Contents of `version.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    /// Container format version; missing or non-positive means the file is unusable
    #[serde(default)]
    pub version: Option<i64>,

    /// Version of the application that wrote the file
    #[serde(default)]
    pub created_with: String,
}

impl VersionDescriptor {
    /// Descriptor for a file written now by `app_version`.
    pub fn current(app_version: &str) -> Self {
        Self {
            version: Some(ContainerFormat::CURRENT.number() as i64),
            created_with: app_version.to_string(),
        }
    }
}

/// A document as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// The lyrics text
    pub primary_text: String,

    /// Format version and producing app version
    pub version: VersionDescriptor,

    /// Raw extension payloads, in archive order
    pub extension_payloads: IndexMap<ExtensionKey, Vec<u8>>,
}

impl Container {
    /// A container holding only text, stamped with the current format.
    pub fn new(primary_text: impl Into<String>, app_version: &str) -> Self {
        Self {
            primary_text: primary_text.into(),
            version: VersionDescriptor::current(app_version),
            extension_payloads: IndexMap::new(),
        }
    }
}

/// What is known about a file before choosing a handler.
#[derive(Debug, Clone, Copy)]
pub struct FileCandidate<'a> {
    /// File name (or full path)
    pub name: &'a str,
    /// Declared media type, if the platform provided one
    pub media_type: Option<&'a str>,
    /// Leading bytes of the file; may be empty when creating a file
    pub head: &'a [u8],
}

impl<'a> FileCandidate<'a> {
    /// A candidate known only by name.
    pub fn named(name: &'a str) -> Self {
        Self {
            name,
            media_type: None,
            head: &[],
        }
    }

    /// Lowercased extension of the file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        let file_name = self.name.rsplit(['/', '\\']).next().unwrap_or(self.name);
        let (stem, extension) = file_name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(extension.to_ascii_lowercase())
    }
}

/// Reads and writes one on-disk format.
pub trait FileHandler: Send + Sync {
    /// Human-readable name for this handler
    fn name(&self) -> &str;

    /// Whether this handler should be used for the file.
    fn can_handle(&self, file: &FileCandidate<'_>) -> bool;

    /// Decode file bytes.
    fn load(&self, bytes: &[u8]) -> Result<Container>;

    /// Encode a container as file bytes.
    fn create(&self, container: &Container) -> Result<Vec<u8>>;
}

/// Ordered list of file handlers; the first match wins.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn FileHandler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_app_version(env!("CARGO_PKG_VERSION"))
    }
}

impl HandlerRegistry {
    /// The built-in handlers, stamping files with `app_version`.
    ///
    /// Rich containers come first, so a misnamed archive is never read as text.
    pub fn with_app_version(app_version: &str) -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RichContainerHandler::with_app_version(app_version)));
        registry.register(Box::new(PlainTextHandler::with_app_version(app_version)));
        registry
    }

    /// A registry with no handlers.
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Append a handler at the lowest priority.
    pub fn register(&mut self, handler: Box<dyn FileHandler>) {
        self.handlers.push(handler);
    }

    /// The first handler that recognises `file`.
    pub fn find(&self, file: &FileCandidate<'_>) -> Option<&dyn FileHandler> {
        self.handlers
            .iter()
            .find(|handler| handler.can_handle(file))
            .map(|handler| handler.as_ref())
    }

    /// Names of the registered handlers, in priority order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handler_names())
            .finish()
    }
}
