//! Filesystem document source for plain text and Markdown.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::errors::DocumentError;
use crate::domain::ports::{DocumentSet, DocumentSource};

/// Extensions read directly as UTF-8 text.
const TEXT_FORMATS: &[&str] = &["txt", "md", "markdown"];

/// Office/PDF formats recognised but not extracted here.
const EXTERNAL_FORMATS: &[&str] = &["pdf", "docx", "pptx", "xlsx"];

/// Reads documents from local paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDocumentSource;

impl FsDocumentSource {
    pub const fn new() -> Self {
        Self
    }

    async fn read_one(path: &Path) -> Result<(String, String), DocumentError> {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if !TEXT_FORMATS.contains(&extension.as_str()) {
            let format = if EXTERNAL_FORMATS.contains(&extension.as_str()) {
                format!(".{extension} (text extraction for this format is not built in)")
            } else if extension.is_empty() {
                format!("{name} has no file extension")
            } else {
                format!(".{extension}")
            };
            return Err(DocumentError::UnsupportedFormat(format));
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocumentError::NotFound(path.display().to_string()));
            }
            Err(e) => {
                return Err(DocumentError::ParseFailure {
                    name,
                    reason: e.to_string(),
                });
            }
        };

        let text = String::from_utf8(bytes).map_err(|e| DocumentError::ParseFailure {
            name: name.clone(),
            reason: format!("not valid UTF-8: {e}"),
        })?;

        debug!(document = %name, chars = text.chars().count(), "document read");
        Ok((name, text))
    }
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn resolve(&self, paths: &[PathBuf]) -> Result<DocumentSet, DocumentError> {
        let mut documents = DocumentSet::new();
        for path in paths {
            let (name, text) = Self::read_one(path).await?;
            documents.insert(name, text);
        }
        info!(documents = documents.len(), "documents resolved");
        Ok(documents)
    }

    fn supported_formats(&self) -> Vec<&'static str> {
        TEXT_FORMATS.to_vec()
    }
}
