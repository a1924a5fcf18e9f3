//! Document source port - turns input paths into text.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::errors::DocumentError;

/// Resolved documents keyed by file name.
pub type DocumentSet = BTreeMap<String, String>;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Read every path, failing on the first document that cannot be used.
    async fn resolve(&self, paths: &[PathBuf]) -> Result<DocumentSet, DocumentError>;

    /// File extensions (without the dot) this source accepts.
    fn supported_formats(&self) -> Vec<&'static str>;
}
