//! Writes individual resources to disk.
//!
//! Images are decoded and re-encoded as PNG (or copied verbatim when
//! configured); everything else goes through UTF-8 text decoding.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::{MaterializedItem, ResourceKind, ResourceRecord};
use crate::source::ResourceSource;

use super::error::MaterializeError;

/// What to do with image payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageHandling {
    /// Decode and write back out as PNG, normalizing the pixel format
    #[default]
    Reencode,

    /// Copy the embedded bytes unchanged
    Verbatim,
}

/// Per-resource write behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializerOptions {
    #[serde(default)]
    pub image_handling: ImageHandling,

    /// Treat an unavailable stream as an error instead of writing an empty file
    #[serde(default)]
    pub strict_missing: bool,
}

/// Writes one resource at a time under a session root
#[derive(Debug, Clone, Default)]
pub struct ResourceMaterializer {
    options: MaterializerOptions,
}

impl ResourceMaterializer {
    pub fn new(options: MaterializerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MaterializerOptions {
        &self.options
    }

    /// Read `record` from `source` and write it under `root`
    pub async fn materialize(
        &self,
        source: &dyn ResourceSource,
        record: &ResourceRecord,
        root: &Path,
    ) -> Result<MaterializedItem, MaterializeError> {
        ensure_contained(record)?;

        let bytes = source
            .read_bytes(&record.raw_identifier)
            .await
            .map_err(|e| MaterializeError::from_source(&record.raw_identifier, e))?;

        self.write(record, bytes, root).await
    }

    /// Write already-read bytes for `record` under `root`
    pub async fn write(
        &self,
        record: &ResourceRecord,
        bytes: Option<Vec<u8>>,
        root: &Path,
    ) -> Result<MaterializedItem, MaterializeError> {
        ensure_contained(record)?;
        let path = record.destination(root);

        let bytes = match bytes {
            Some(bytes) => bytes,
            None if self.options.strict_missing => {
                return Err(MaterializeError::MissingResource(record.raw_identifier.clone()));
            }
            None => {
                warn!(
                    identifier = %record.raw_identifier,
                    "Resource stream unavailable, writing empty file"
                );
                Vec::new()
            }
        };

        match record.kind {
            ResourceKind::Image => self.write_image(&path, bytes).await?,
            ResourceKind::Text => write_text(&path, &record.raw_identifier, bytes).await?,
        }

        debug!(path = %path.display(), kind = %record.kind, "Materialized resource");
        Ok(MaterializedItem::new(record.kind, path))
    }

    async fn write_image(&self, path: &Path, bytes: Vec<u8>) -> Result<(), MaterializeError> {
        if bytes.is_empty() || self.options.image_handling == ImageHandling::Verbatim {
            return write_bytes(path, &bytes).await;
        }

        let target = path.to_path_buf();
        let encoded = tokio::task::spawn_blocking(move || reencode_png(&target, &bytes))
            .await
            .map_err(|e| MaterializeError::Task(e.to_string()))??;

        write_bytes(path, &encoded).await
    }
}

/// Refuse records whose relative path would land outside the root
pub(crate) fn ensure_contained(record: &ResourceRecord) -> Result<(), MaterializeError> {
    if record.is_contained() {
        Ok(())
    } else {
        Err(MaterializeError::UnsafePath {
            identifier: record.raw_identifier.clone(),
            relative_path: record.relative_path.clone(),
        })
    }
}

/// Decode any supported image format and encode it as PNG
fn reencode_png(path: &Path, bytes: &[u8]) -> Result<Vec<u8>, MaterializeError> {
    let image_error = |source| MaterializeError::Image {
        path: PathBuf::from(path),
        source,
    };

    let image = image::load_from_memory(bytes).map_err(image_error)?;

    let mut encoded = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .map_err(image_error)?;
    Ok(encoded)
}

async fn write_text(path: &Path, identifier: &str, bytes: Vec<u8>) -> Result<(), MaterializeError> {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(identifier, "Resource is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };

    write_bytes(path, text.as_bytes()).await
}

async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), MaterializeError> {
    fs::write(path, bytes)
        .await
        .map_err(|e| MaterializeError::io(path, e))
}
