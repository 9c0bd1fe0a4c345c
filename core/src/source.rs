use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

use crate::tokenizer::Language;
use crate::Document;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("unreadable or corrupt file: {0}")]
    Unreadable(String),
    #[error("no text extractor for {0} files")]
    Unsupported(DocumentKind),
    #[error("file is {size_mb} MB, above the {limit_mb} MB limit")]
    TooLarge { size_mb: u64, limit_mb: u64 },
}

/// File families the viewer knows how to open, judged by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Word,
    PowerPoint,
    Excel,
    Image,
    Text,
    Other,
}

impl DocumentKind {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => DocumentKind::Pdf,
            "doc" | "docx" => DocumentKind::Word,
            "ppt" | "pptx" => DocumentKind::PowerPoint,
            "xls" | "xlsx" | "xlsm" => DocumentKind::Excel,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tiff" | "svg" => DocumentKind::Image,
            "txt" | "md" | "log" => DocumentKind::Text,
            _ => DocumentKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Word => "word",
            DocumentKind::PowerPoint => "powerpoint",
            DocumentKind::Excel => "excel",
            DocumentKind::Image => "image",
            DocumentKind::Text => "text",
            DocumentKind::Other => "other",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Anything that can hand the indexer a document's text.
///
/// Format-specific extraction lives behind this trait; the index only ever
/// sees the returned string.
pub trait TextSource: Send + Sync {
    fn id(&self) -> &str;

    fn path(&self) -> &str { self.id() }

    fn last_modified(&self) -> Option<SystemTime> { None }

    fn language_hint(&self) -> Option<Language> { None }

    fn extract(&self) -> Result<String, ExtractionError>;
}

impl TextSource for Document {
    fn id(&self) -> &str { &self.id }
    fn path(&self) -> &str { &self.path }
    fn last_modified(&self) -> Option<SystemTime> { self.last_modified }
    fn extract(&self) -> Result<String, ExtractionError> { Ok(self.text.clone()) }
}

impl<T: TextSource + ?Sized> TextSource for Arc<T> {
    fn id(&self) -> &str { (**self).id() }
    fn path(&self) -> &str { (**self).path() }
    fn last_modified(&self) -> Option<SystemTime> { (**self).last_modified() }
    fn language_hint(&self) -> Option<Language> { (**self).language_hint() }
    fn extract(&self) -> Result<String, ExtractionError> { (**self).extract() }
}

/// A document upstream already failed to read.
#[derive(Debug, Clone)]
pub struct FailedExtraction {
    pub id: String,
    pub path: String,
    pub error: ExtractionError,
}

impl FailedExtraction {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        let id = id.into();
        Self { path: id.clone(), id, error: ExtractionError::Unreadable(reason.into()) }
    }
}

impl TextSource for FailedExtraction {
    fn id(&self) -> &str { &self.id }
    fn path(&self) -> &str { &self.path }
    fn extract(&self) -> Result<String, ExtractionError> { Err(self.error.clone()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_from_extension() {
        assert_eq!(DocumentKind::from_path("a/b/Report.PDF"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_path("slides.pptx"), DocumentKind::PowerPoint);
        assert_eq!(DocumentKind::from_path("sheet.xlsm"), DocumentKind::Excel);
        assert_eq!(DocumentKind::from_path("notes.md"), DocumentKind::Text);
        assert_eq!(DocumentKind::from_path("noext"), DocumentKind::Other);
    }

    #[test]
    fn failed_extraction_reports_reason() {
        let f = FailedExtraction::new("broken.pdf", "bad xref table");
        assert_eq!(f.extract(), Err(ExtractionError::Unreadable("bad xref table".into())));
        assert_eq!(f.path(), "broken.pdf");
    }
}
