//! Implementation of the `reqforge formats` command.

use anyhow::Result;
use serde::Serialize;

use crate::adapters::documents::FsDocumentSource;
use crate::cli::output::{output, CommandOutput};
use crate::domain::ports::DocumentSource;

#[derive(Debug, Serialize)]
pub struct FormatsOutput {
    pub supported: Vec<&'static str>,
}

impl CommandOutput for FormatsOutput {
    fn to_human(&self) -> String {
        let mut lines = vec!["Supported document formats:".to_string()];
        lines.extend(self.supported.iter().map(|f| format!("  - .{f}")));
        lines.push(String::new());
        lines.push("Convert .pdf, .docx, .pptx and .xlsx files to text first.".to_string());
        lines.join("\n")
    }
}

pub async fn execute(json_mode: bool) -> Result<()> {
    let source = FsDocumentSource::new();
    output(
        &FormatsOutput {
            supported: source.supported_formats(),
        },
        json_mode,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_text_formats() {
        let out = FormatsOutput {
            supported: FsDocumentSource::new().supported_formats(),
        };
        assert!(out.to_human().contains(".md"));
        assert!(out.to_human().contains(".txt"));
        assert!(out.to_json()["supported"].is_array());
    }
}
