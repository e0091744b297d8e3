use std::path::Path;

use crate::config::{CONVERTIBLE_EXTENSIONS, PLAIN_TEXT_EXTENSIONS};
use crate::error::Result;

use super::extractors::{DocxExtractor, PdfExtractor, PptxExtractor, XlsxExtractor};

/// Extract text from a file, routed by extension. Office formats and PDF
/// go through the converters; md/markdown/txt are read as lossy UTF-8;
/// anything else yields an empty string (silently skipped, not an error).
pub fn extract_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if CONVERTIBLE_EXTENSIONS.contains(&extension.as_str()) {
        let bytes = std::fs::read(path)?;
        return match extension.as_str() {
            "pdf" => PdfExtractor::extract(&bytes),
            "docx" => DocxExtractor::extract(&bytes),
            "xlsx" | "xls" => XlsxExtractor::extract(&bytes),
            "pptx" => PptxExtractor::extract(&bytes),
            _ => unreachable!("extension set and router are kept in sync"),
        };
    }

    if PLAIN_TEXT_EXTENSIONS.contains(&extension.as_str()) {
        let bytes = std::fs::read(path)?;
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    Ok(String::new())
}

/// Char-boundary-safe prefix of at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_text_reads_lossily() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(b"hello \xff world").unwrap();
        let text = extract_text(file.path()).unwrap();
        assert!(text.starts_with("hello "));
        assert!(text.ends_with(" world"));
    }

    #[test]
    fn unknown_extension_is_skipped_silently() {
        let file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        assert_eq!(extract_text(file.path()).unwrap(), "");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("中文内容", 2), "中文");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
