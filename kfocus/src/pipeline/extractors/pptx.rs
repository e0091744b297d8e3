use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::{KfError, Result};

pub struct PptxExtractor;

impl PptxExtractor {
    /// Slides in deck order, one `## Slide N` section each, speaker notes
    /// appended when present.
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let cursor = Cursor::new(bytes);
        let mut archive = ZipArchive::new(cursor)
            .map_err(|e| KfError::Parse(format!("PPTX parse error: {e}")))?;

        let mut slide_numbers: Vec<usize> = (0..archive.len())
            .filter_map(|i| {
                let name = archive.name_for_index(i)?;
                Self::slide_number(name)
            })
            .collect();
        slide_numbers.sort_unstable();
        slide_numbers.dedup();

        let mut text = String::new();
        for slide_number in slide_numbers {
            let slide_path = format!("ppt/slides/slide{slide_number}.xml");
            let slide_text = Self::read_entry(&mut archive, &slide_path)
                .map(|xml| Self::collect_text(&xml))
                .unwrap_or_default();

            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&format!("## Slide {slide_number}"));
            if !slide_text.trim().is_empty() {
                text.push_str("\n\n");
                text.push_str(slide_text.trim());
            }

            let notes_path = format!("ppt/notesSlides/notesSlide{slide_number}.xml");
            if let Some(notes) = Self::read_entry(&mut archive, &notes_path)
                .map(|xml| Self::collect_text(&xml))
                .filter(|notes| !notes.trim().is_empty())
            {
                text.push_str("\n\n[Notes]: ");
                text.push_str(notes.trim());
            }
        }

        Ok(text)
    }

    fn slide_number(entry_name: &str) -> Option<usize> {
        entry_name
            .strip_prefix("ppt/slides/slide")?
            .strip_suffix(".xml")?
            .parse()
            .ok()
    }

    fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Option<String> {
        let mut entry = archive.by_name(name).ok()?;
        let mut content = String::new();
        entry.read_to_string(&mut content).ok()?;
        Some(content)
    }

    /// Gather `<a:t>` runs, breaking lines at `</a:p>` paragraph ends.
    fn collect_text(xml: &str) -> String {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut lines: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut in_text = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) if e.name().as_ref() == b"a:t" => in_text = true,
                Ok(Event::Text(e)) if in_text => {
                    if let Ok(decoded) = e.decode() {
                        if let Ok(fragment) = quick_xml::escape::unescape(&decoded) {
                            current.push_str(&fragment);
                        }
                    }
                }
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"a:t" => in_text = false,
                    b"a:p" => {
                        if !current.trim().is_empty() {
                            lines.push(current.trim().to_string());
                        }
                        current.clear();
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(_) => break,
                _ => {}
            }
            buf.clear();
        }

        if !current.trim().is_empty() {
            lines.push(current.trim().to_string());
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slide_numbers_parse_from_entry_names() {
        assert_eq!(PptxExtractor::slide_number("ppt/slides/slide1.xml"), Some(1));
        assert_eq!(PptxExtractor::slide_number("ppt/slides/slide12.xml"), Some(12));
        assert_eq!(PptxExtractor::slide_number("ppt/slideLayouts/slideLayout1.xml"), None);
        assert_eq!(PptxExtractor::slide_number("ppt/slides/slide1.xml.rels"), None);
    }

    #[test]
    fn collect_text_breaks_on_paragraphs() {
        let xml = r#"<p:sld xmlns:a="urn:a" xmlns:p="urn:p">
            <a:p><a:r><a:t>Title line</a:t></a:r></a:p>
            <a:p><a:r><a:t>Body </a:t></a:r><a:r><a:t>text</a:t></a:r></a:p>
        </p:sld>"#;
        let text = PptxExtractor::collect_text(xml);
        assert_eq!(text, "Title line\nBody text");
    }

    #[test]
    fn invalid_bytes_are_a_parse_error() {
        let error = PptxExtractor::extract(b"not a zip archive").unwrap_err();
        assert!(matches!(error, KfError::Parse(_)));
    }
}
