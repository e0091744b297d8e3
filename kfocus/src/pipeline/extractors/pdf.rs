use crate::error::{KfError, Result};

pub struct PdfExtractor;

impl PdfExtractor {
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| KfError::Parse(format!("PDF parse error: {e}")))?;

        // Collapse the extractor's page padding into paragraph breaks.
        let mut cleaned = String::with_capacity(text.len());
        let mut blank_run = 0usize;
        for line in text.lines() {
            if line.trim().is_empty() {
                blank_run += 1;
                continue;
            }
            if !cleaned.is_empty() {
                cleaned.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
            }
            blank_run = 0;
            cleaned.push_str(line.trim_end());
        }

        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_bytes_are_a_parse_error() {
        let error = PdfExtractor::extract(b"not a pdf").unwrap_err();
        assert!(matches!(error, KfError::Parse(_)));
    }
}
