use std::io::{Cursor, Read, Write};

use indexmap::IndexMap;
use zip::ZipArchive;
use zip::ZipWriter;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

use super::{Container, ContainerFormat, FileCandidate, FileHandler, VersionDescriptor};
use crate::error::{LyricsError, Result};
use crate::extension::{ExtensionKey, FormatVersion};

/// Media type declared for rich containers.
pub const CONTAINER_MEDIA_TYPE: &str = "application/zip";

/// File name extension for rich containers.
pub const CONTAINER_EXTENSION: &str = "lyrics";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const TEXT_ENTRY: &str = "lyrics.txt";
const VERSION_ENTRY: &str = "version.json";
const EXTENSION_PREFIX: &str = "extensions/";
const EXTENSION_SUFFIX: &str = ".dat";

/// Zip container holding the lyrics, a version descriptor and extension payloads.
#[derive(Debug, Clone, Default)]
pub struct RichContainerHandler {
    app_version: String,
}

impl RichContainerHandler {
    /// Create a handler that stamps written files with this build's version.
    pub fn new() -> Self {
        Self::with_app_version(env!("CARGO_PKG_VERSION"))
    }

    /// Create a handler that stamps written files with `app_version`.
    pub fn with_app_version(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
        }
    }
}

impl FileHandler for RichContainerHandler {
    fn name(&self) -> &str {
        "Lyrics Container"
    }

    fn can_handle(&self, file: &FileCandidate<'_>) -> bool {
        file.media_type == Some(CONTAINER_MEDIA_TYPE)
            || file.head.starts_with(ZIP_MAGIC)
            || file.extension().as_deref() == Some(CONTAINER_EXTENSION)
    }

    fn load(&self, bytes: &[u8]) -> Result<Container> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| LyricsError::IncompatibleFile(format!("not a zip archive: {}", e)))?;

        let descriptor = read_descriptor(&mut archive)?;
        let version = match descriptor.version {
            Some(version) if version > 0 => version,
            _ => {
                return Err(LyricsError::IncompatibleFile(
                    "version.json does not name a format version".to_string(),
                ));
            }
        };

        let format = u32::try_from(version)
            .ok()
            .and_then(ContainerFormat::from_number)
            .ok_or_else(|| LyricsError::UnsupportedVersion {
                version,
                created_with: descriptor.created_with.clone(),
            })?;

        match format {
            ContainerFormat::V1 => load_v1(&mut archive, descriptor),
        }
    }

    fn create(&self, container: &Container) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

            zip.start_file(TEXT_ENTRY, options)?;
            zip.write_all(container.primary_text.as_bytes())?;

            let descriptor = VersionDescriptor::current(&self.app_version);
            zip.start_file(VERSION_ENTRY, options)?;
            zip.write_all(&serde_json::to_vec(&descriptor)?)?;

            for (key, payload) in &container.extension_payloads {
                let entry = format!("{}{}{}", EXTENSION_PREFIX, key.as_str(), EXTENSION_SUFFIX);
                zip.start_file(entry, options)?;
                zip.write_all(payload)?;
            }

            zip.finish()?;
        }

        log::debug!(
            "Wrote container: {} chars, {} extension(s), {} bytes",
            container.primary_text.chars().count(),
            container.extension_payloads.len(),
            buffer.len()
        );
        Ok(buffer)
    }
}

fn read_descriptor<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<VersionDescriptor> {
    let bytes = match read_entry(archive, VERSION_ENTRY) {
        Ok(bytes) => bytes,
        Err(LyricsError::Archive(ZipError::FileNotFound)) => {
            return Err(LyricsError::IncompatibleFile(
                "missing version.json".to_string(),
            ));
        }
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&bytes)
        .map_err(|e| LyricsError::IncompatibleFile(format!("unreadable version.json: {}", e)))
}

fn load_v1<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    descriptor: VersionDescriptor,
) -> Result<Container> {
    let text_bytes = match read_entry(archive, TEXT_ENTRY) {
        Ok(bytes) => bytes,
        Err(LyricsError::Archive(ZipError::FileNotFound)) => {
            return Err(LyricsError::IncompatibleFile(
                "missing lyrics.txt".to_string(),
            ));
        }
        Err(e) => return Err(e),
    };
    let primary_text = String::from_utf8(text_bytes)
        .map_err(|e| LyricsError::IncompatibleFile(format!("lyrics.txt is not UTF-8: {}", e)))?;

    let extension_entries: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with(EXTENSION_PREFIX) && name.ends_with(EXTENSION_SUFFIX))
        .map(str::to_string)
        .collect();

    let mut extension_payloads = IndexMap::new();
    for entry in extension_entries {
        let name = &entry[EXTENSION_PREFIX.len()..entry.len() - EXTENSION_SUFFIX.len()];
        let Some(key) = ExtensionKey::from_name(name) else {
            log::debug!("Ignoring unknown extension entry '{}'", entry);
            continue;
        };
        extension_payloads.insert(key, read_entry(archive, &entry)?);
    }

    Ok(Container {
        primary_text,
        version: descriptor,
        extension_payloads,
    })
}

fn read_entry<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive.by_name(name)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}
