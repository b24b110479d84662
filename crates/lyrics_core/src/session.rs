//! One open document.
//!
//! A [`DocumentSession`] owns the lyrics text, the live [`Extensions`] and
//! the [`HandlerRegistry`]. Opening a file resets every extension and then
//! feeds each one the payload stored under its key; saving lets each
//! extension capture the current text before it is serialized.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::Config;
use crate::container::{Container, FileCandidate, HandlerRegistry};
use crate::error::{LyricsError, Result};
use crate::extension::{self, Extensions};
use crate::fs::FileSystem;
use crate::history::HistoryLedger;

/// The document currently open in the editor.
#[derive(Debug)]
pub struct DocumentSession {
    text: String,
    extensions: Extensions,
    handlers: HandlerRegistry,
    app_version: String,
    path: Option<PathBuf>,
}

impl Default for DocumentSession {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

impl DocumentSession {
    /// An empty, unsaved document using the built-in file handlers.
    pub fn new(app_version: &str) -> Self {
        Self::with_handlers(app_version, HandlerRegistry::with_app_version(app_version))
    }

    /// An empty document stamped with the configured app version.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.app_version)
    }

    /// An empty document using custom file handlers.
    pub fn with_handlers(app_version: &str, handlers: HandlerRegistry) -> Self {
        Self {
            text: String::new(),
            extensions: Extensions::default(),
            handlers,
            app_version: app_version.to_string(),
            path: None,
        }
    }

    /// Stamp history entries from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.extensions = Extensions::with_history(HistoryLedger::with_clock(clock));
        self
    }

    /// Current lyrics text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the lyrics text without recording history.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Record the current text as a history entry. Returns whether one was added.
    pub fn checkpoint(&mut self) -> bool {
        let text = self.text.clone();
        self.extensions.history_mut().ledger_mut().add(&text)
    }

    /// Where the document was last opened from or saved to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The document's history.
    pub fn history(&self) -> &HistoryLedger {
        self.extensions.history().ledger()
    }

    /// The document's history, mutably.
    pub fn history_mut(&mut self) -> &mut HistoryLedger {
        self.extensions.history_mut().ledger_mut()
    }

    /// Adopt history recovered after a crash.
    ///
    /// The document's history becomes a copy of `recovered` and its latest
    /// text becomes the document text. The result has never been saved, so
    /// the path is cleared. Typically fed from
    /// [`RecoveryManager::ledger`](crate::recovery::RecoveryManager::ledger)
    /// after a restore.
    pub fn restore_history(&mut self, recovered: &HistoryLedger) {
        let text = {
            let history = self.history_mut();
            history.deserialize(&recovered.serialize());
            history.full_text()
        };
        self.text = text;
        self.path = None;
    }

    /// The live extensions.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Start a new, empty document.
    pub fn new_document(&mut self) {
        self.text.clear();
        self.extensions.reset_all();
        self.path = None;
    }

    /// Open a document from raw file bytes.
    ///
    /// Nothing changes if the file cannot be loaded.
    pub fn open(&mut self, file: &FileCandidate<'_>, bytes: &[u8]) -> Result<()> {
        let handler = self
            .handlers
            .find(file)
            .ok_or_else(|| LyricsError::NoHandler(file.name.to_string()))?;
        let container = handler.load(bytes)?;

        log::info!(
            "Opened '{}' with {} (created with {})",
            file.name,
            handler.name(),
            container.version.created_with
        );

        self.extensions.reset_all();
        for (key, payload) in &container.extension_payloads {
            let capsule = extension::decode_capsule(payload);
            self.extensions.get_mut(*key).deserialize(&capsule);
        }
        self.text = container.primary_text;
        Ok(())
    }

    /// Encode the document for a file named `name`.
    pub fn save(&mut self, name: &str) -> Result<Vec<u8>> {
        let candidate = FileCandidate::named(name);
        let handler = self
            .handlers
            .find(&candidate)
            .ok_or_else(|| LyricsError::NoHandler(name.to_string()))?;

        let text = self.text.clone();
        self.extensions
            .for_each_mut(|extension| extension.on_before_capture(&text));

        let mut container = Container::new(text, &self.app_version);
        for extension in self.extensions.iter() {
            container
                .extension_payloads
                .insert(extension.key(), extension::encode_capsule(&extension.serialize()));
        }

        handler.create(&container)
    }

    /// Read and open the file at `path`.
    pub fn open_file<FS: FileSystem>(&mut self, fs: &FS, path: &Path) -> Result<()> {
        let bytes = fs.read_binary(path).map_err(|source| LyricsError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path.to_string_lossy();
        let candidate = FileCandidate {
            name: &name,
            media_type: None,
            head: &bytes,
        };
        self.open(&candidate, &bytes)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Save the document to `path`.
    pub fn save_file<FS: FileSystem>(&mut self, fs: &FS, path: &Path) -> Result<()> {
        let bytes = self.save(&path.to_string_lossy())?;
        fs.write_binary(path, &bytes)
            .map_err(|source| LyricsError::FileWrite {
                path: path.to_path_buf(),
                source,
            })?;
        log::debug!("Saved {} bytes to {:?}", bytes.len(), path);
        self.path = Some(path.to_path_buf());
        Ok(())
    }
}
