use std::path::{Path, PathBuf};

use base64::Engine;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

use crate::error::{KfError, Result};
use crate::gateway::ModelGateway;

use super::extract::extract_text;
use super::prompts::IMAGE_CAPTION_PROMPT;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocItemKind {
    Text,
    Table,
    Image,
}

/// One structural element of a parsed document. For images, `text` holds
/// the caption produced by the vision hook (or the alt text when vision is
/// unavailable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocItem {
    pub kind: DocItemKind,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub source_path: String,
    pub items: Vec<DocItem>,
}

/// Structure-aware document parser. Office formats and PDF go through the
/// markdown converters and are segmented line-wise; native markdown is
/// walked with pulldown-cmark so local images can be captioned through the
/// VISION capability. The intermediate result is persisted as JSON under
/// the parse cache for inspection and reprocessing.
pub struct DocumentParser {
    gateway: ModelGateway,
    cache_dir: PathBuf,
}

impl DocumentParser {
    pub fn new(gateway: ModelGateway, cache_dir: PathBuf) -> Self {
        Self { gateway, cache_dir }
    }

    pub async fn parse(&self, path: &Path) -> Result<(ParsedDocument, PathBuf)> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let items = match extension.as_str() {
            "md" | "markdown" => {
                let text = extract_text(path)?;
                self.parse_markdown(&text, path).await?
            }
            _ => {
                let text = extract_text(path)?;
                if text.trim().is_empty() {
                    return Err(KfError::Parse(format!(
                        "No content extracted from {}",
                        path.display()
                    )));
                }
                segment_lines(&text)
            }
        };

        if items.is_empty() {
            return Err(KfError::Parse(format!(
                "Document {} produced no items",
                path.display()
            )));
        }

        let parsed = ParsedDocument {
            source_path: path.display().to_string(),
            items,
        };
        let cache_path = self.persist(&parsed, path)?;
        Ok((parsed, cache_path))
    }

    fn persist(&self, parsed: &ParsedDocument, source: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let cache_path = self.cache_dir.join(format!("{stem}.json"));
        std::fs::write(&cache_path, serde_json::to_vec_pretty(parsed)?)?;
        Ok(cache_path)
    }

    async fn parse_markdown(&self, text: &str, source: &Path) -> Result<Vec<DocItem>> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        let parser = Parser::new_ext(text, options);

        let mut items: Vec<DocItem> = Vec::new();
        let mut paragraph = String::new();
        let mut table_rows: Vec<Vec<String>> = Vec::new();
        let mut table_cell = String::new();
        let mut table_row: Vec<String> = Vec::new();
        let mut in_table = false;
        let mut pending_image: Option<(String, String)> = None;

        for event in parser {
            match event {
                Event::Start(Tag::Table(_)) => {
                    flush_paragraph(&mut items, &mut paragraph);
                    in_table = true;
                    table_rows.clear();
                }
                Event::End(TagEnd::Table) => {
                    in_table = false;
                    let rendered = super::extractors::docx::render_pipe_table(&table_rows);
                    if !rendered.is_empty() {
                        items.push(DocItem {
                            kind: DocItemKind::Table,
                            text: rendered,
                        });
                    }
                    table_rows.clear();
                }
                Event::Start(Tag::TableRow) | Event::Start(Tag::TableHead) => {
                    table_row.clear();
                }
                Event::End(TagEnd::TableRow) | Event::End(TagEnd::TableHead) => {
                    if !table_row.is_empty() {
                        table_rows.push(std::mem::take(&mut table_row));
                    }
                }
                Event::End(TagEnd::TableCell) => {
                    table_row.push(std::mem::take(&mut table_cell).trim().to_string());
                }
                Event::Start(Tag::Image { dest_url, .. }) => {
                    pending_image = Some((dest_url.to_string(), String::new()));
                }
                Event::End(TagEnd::Image) => {
                    if let Some((url, alt)) = pending_image.take() {
                        flush_paragraph(&mut items, &mut paragraph);
                        let caption = self.caption_image(source, &url, &alt).await;
                        items.push(DocItem {
                            kind: DocItemKind::Image,
                            text: caption,
                        });
                    }
                }
                Event::Text(fragment) => {
                    if let Some((_, alt)) = pending_image.as_mut() {
                        alt.push_str(&fragment);
                    } else if in_table {
                        table_cell.push_str(&fragment);
                    } else {
                        paragraph.push_str(&fragment);
                    }
                }
                Event::Code(code) => {
                    if in_table {
                        table_cell.push_str(&code);
                    } else {
                        paragraph.push_str(&code);
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    if !in_table {
                        paragraph.push('\n');
                    }
                }
                Event::End(TagEnd::Paragraph)
                | Event::End(TagEnd::Heading(_))
                | Event::End(TagEnd::Item)
                | Event::End(TagEnd::CodeBlock) => {
                    flush_paragraph(&mut items, &mut paragraph);
                }
                _ => {}
            }
        }
        flush_paragraph(&mut items, &mut paragraph);

        Ok(items)
    }

    /// Picture-description hook: local images are read and captioned via
    /// the VISION capability. Failures degrade to the alt text — a missing
    /// vision model must not sink the whole parse.
    async fn caption_image(&self, source: &Path, url: &str, alt: &str) -> String {
        let fallback = if alt.trim().is_empty() {
            format!("Image: {url}")
        } else {
            format!("Image: {alt}")
        };

        if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("data:") {
            return fallback;
        }

        let image_path = source.parent().map(|p| p.join(url)).unwrap_or_else(|| url.into());
        let bytes = match std::fs::read(&image_path) {
            Ok(bytes) => bytes,
            Err(_) => return fallback,
        };

        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        match self
            .gateway
            .describe_image(&encoded, IMAGE_CAPTION_PROMPT)
            .await
        {
            Ok(caption) => caption,
            Err(error) => {
                tracing::debug!(
                    image = %image_path.display(),
                    error = %error,
                    "Image caption failed, using alt text"
                );
                fallback
            }
        }
    }
}

fn flush_paragraph(items: &mut Vec<DocItem>, paragraph: &mut String) {
    let text = paragraph.trim();
    if !text.is_empty() {
        items.push(DocItem {
            kind: DocItemKind::Text,
            text: text.to_string(),
        });
    }
    paragraph.clear();
}

fn is_table_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('|') && trimmed.len() > 1
}

/// Segment converter output into typed items: contiguous pipe-table runs
/// become tables, everything else groups into paragraph blocks.
pub fn segment_lines(text: &str) -> Vec<DocItem> {
    let mut items = Vec::new();
    let mut block = String::new();
    let mut block_is_table = false;

    let mut flush = |block: &mut String, is_table: bool, items: &mut Vec<DocItem>| {
        let text = block.trim();
        if !text.is_empty() {
            items.push(DocItem {
                kind: if is_table {
                    DocItemKind::Table
                } else {
                    DocItemKind::Text
                },
                text: text.to_string(),
            });
        }
        block.clear();
    };

    for line in text.lines() {
        let line_is_table = is_table_line(line);

        if line.trim().is_empty() {
            flush(&mut block, block_is_table, &mut items);
            block_is_table = false;
            continue;
        }

        if line_is_table != block_is_table && !block.is_empty() {
            flush(&mut block, block_is_table, &mut items);
        }
        block_is_table = line_is_table;

        if !block.is_empty() {
            block.push('\n');
        }
        block.push_str(line);
    }
    flush(&mut block, block_is_table, &mut items);

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_separates_tables_from_prose() {
        let text = "Intro paragraph.\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\nClosing thoughts.";
        let items = segment_lines(text);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].kind, DocItemKind::Text);
        assert_eq!(items[1].kind, DocItemKind::Table);
        assert_eq!(items[2].kind, DocItemKind::Text);
    }

    #[test]
    fn segment_splits_adjacent_table_and_prose_without_blank_line() {
        let text = "Numbers below\n| x |\n| 1 |";
        let items = segment_lines(text);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, DocItemKind::Text);
        assert_eq!(items[1].kind, DocItemKind::Table);
    }

    #[test]
    fn segment_of_empty_text_is_empty() {
        assert!(segment_lines("").is_empty());
        assert!(segment_lines("\n\n\n").is_empty());
    }
}
