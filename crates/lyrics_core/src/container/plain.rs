use super::{Container, FileCandidate, FileHandler};
use crate::error::Result;

/// Media type of plain text files.
pub const PLAIN_TEXT_MEDIA_TYPE: &str = "text/plain";

const PLAIN_TEXT_EXTENSIONS: [&str; 2] = ["txt", "text"];

/// Reads and writes bare text files.
///
/// Only the primary text survives a round-trip; extension payloads are
/// neither read nor written.
#[derive(Debug, Clone, Default)]
pub struct PlainTextHandler {
    app_version: String,
}

impl PlainTextHandler {
    /// Create a handler stamping loaded containers with this build's version.
    pub fn new() -> Self {
        Self::with_app_version(env!("CARGO_PKG_VERSION"))
    }

    /// Create a handler stamping loaded containers with `app_version`.
    pub fn with_app_version(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
        }
    }
}

impl FileHandler for PlainTextHandler {
    fn name(&self) -> &str {
        "Plain Text"
    }

    fn can_handle(&self, file: &FileCandidate<'_>) -> bool {
        if file
            .media_type
            .is_some_and(|media_type| media_type.starts_with(PLAIN_TEXT_MEDIA_TYPE))
        {
            return true;
        }
        file.extension()
            .is_some_and(|extension| PLAIN_TEXT_EXTENSIONS.contains(&extension.as_str()))
    }

    fn load(&self, bytes: &[u8]) -> Result<Container> {
        let text = match String::from_utf8(bytes.to_vec()) {
            Ok(text) => text,
            Err(e) => {
                log::debug!("Plain text file is not UTF-8 ({}), decoding lossily", e);
                String::from_utf8_lossy(bytes).into_owned()
            }
        };
        Ok(Container::new(text, &self.app_version))
    }

    fn create(&self, container: &Container) -> Result<Vec<u8>> {
        if !container.extension_payloads.is_empty() {
            log::debug!(
                "Plain text save drops {} extension payload(s)",
                container.extension_payloads.len()
            );
        }
        Ok(container.primary_text.as_bytes().to_vec())
    }
}
