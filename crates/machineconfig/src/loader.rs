//! Multi-document YAML loader.
//!
//! Decodes a byte stream into a readonly [`Container`]. Every document is
//! decoded through the [`Registry`]; keys the concrete type does not know
//! fail the load, unregistered kinds are kept as `Unknown` placeholders.

use crate::constants::MAX_CONFIG_SIZE;
use crate::container::Container;
use crate::error::LoadError;
use crate::registry::Registry;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_yaml::Value;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// First two bytes of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Loader settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Decode `$patch: delete` documents as tombstones
    pub allow_patch_delete: bool,
}

impl LoadOptions {
    /// Options for loading configuration patches.
    pub fn patch() -> Self {
        Self {
            allow_patch_delete: true,
        }
    }
}

/// Decodes YAML streams with a given registry.
#[derive(Debug, Clone, Copy)]
pub struct Loader<'a> {
    registry: &'a Registry,
    options: LoadOptions,
}

impl Default for Loader<'static> {
    fn default() -> Self {
        Self::new(Registry::global(), LoadOptions::default())
    }
}

impl<'a> Loader<'a> {
    /// Loader over `registry`.
    pub fn new(registry: &'a Registry, options: LoadOptions) -> Self {
        Self { registry, options }
    }

    /// Decodes in-memory bytes.
    pub fn load_bytes(&self, bytes: Vec<u8>) -> Result<Container, LoadError> {
        if bytes.len() > MAX_CONFIG_SIZE {
            return Err(LoadError::TooLarge {
                size: bytes.len(),
                limit: MAX_CONFIG_SIZE,
            });
        }

        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_slice(&bytes) {
            let value = Value::deserialize(document).map_err(crate::error::DecodeError::from)?;
            if value.is_null() {
                continue;
            }
            documents.push(self.registry.decode(value, self.options.allow_patch_delete)?);
        }

        if documents.is_empty() {
            return Err(LoadError::NoConfig);
        }

        debug!("Loaded {} configuration documents ({} bytes)", documents.len(), bytes.len());
        Ok(Container::new_readonly(documents, bytes)?)
    }

    /// Reads `reader` to the end, then decodes it.
    pub fn load_reader<R: Read>(&self, reader: R) -> Result<Container, LoadError> {
        let mut bytes = Vec::new();
        reader
            .take(MAX_CONFIG_SIZE as u64 + 1)
            .read_to_end(&mut bytes)?;
        self.load_bytes(bytes)
    }

    /// Reads and decodes a file.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Container, LoadError> {
        let file = std::fs::File::open(path.as_ref())?;
        self.load_reader(file)
    }
}

/// Decodes in-memory bytes with the global registry.
pub fn load_from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Container, LoadError> {
    Loader::default().load_bytes(bytes.into())
}

/// Decodes a reader with the global registry.
pub fn load_from_reader<R: Read>(reader: R) -> Result<Container, LoadError> {
    Loader::default().load_reader(reader)
}

/// Decodes a file with the global registry.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Container, LoadError> {
    Loader::default().load_file(path)
}

/// Whether `bytes` start with the gzip magic.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Gunzips `bytes` if they are gzip-compressed, passes them through otherwise.
///
/// The decompressed size is capped one byte past the loader limit, so an
/// oversized payload still fails with [`LoadError::TooLarge`].
pub fn maybe_decompress(bytes: Vec<u8>) -> Result<Vec<u8>, LoadError> {
    if !is_gzip(&bytes) {
        return Ok(bytes);
    }
    let mut out = Vec::new();
    GzDecoder::new(bytes.as_slice())
        .take(MAX_CONFIG_SIZE as u64 + 1)
        .read_to_end(&mut out)?;
    debug!("Decompressed configuration: {} -> {} bytes", bytes.len(), out.len());
    Ok(out)
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod loader_test;
