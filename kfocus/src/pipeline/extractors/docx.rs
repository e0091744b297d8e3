use crate::error::{KfError, Result};

pub struct DocxExtractor;

impl DocxExtractor {
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let docx = docx_rs::read_docx(bytes)
            .map_err(|e| KfError::Parse(format!("DOCX parse error: {e}")))?;

        let mut text = String::new();

        for child in &docx.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(paragraph) => {
                    let para_text = Self::render_paragraph(paragraph);
                    if !para_text.trim().is_empty() {
                        if !text.is_empty() {
                            text.push_str("\n\n");
                        }
                        text.push_str(&para_text);
                    }
                }
                docx_rs::DocumentChild::Table(table) => {
                    let table_text = Self::render_table(table);
                    if !table_text.is_empty() {
                        if !text.is_empty() {
                            text.push_str("\n\n");
                        }
                        text.push_str(&table_text);
                    }
                }
                _ => {}
            }
        }

        Ok(text)
    }

    fn render_paragraph(paragraph: &docx_rs::Paragraph) -> String {
        let heading_prefix = match &paragraph.property.style {
            Some(style) if style.val == "Title" => "# ".to_string(),
            Some(style) => style
                .val
                .strip_prefix("Heading")
                .and_then(|level| level.parse::<usize>().ok())
                .filter(|level| (1..=6).contains(level))
                .map(|level| "#".repeat(level) + " ")
                .unwrap_or_default(),
            None => String::new(),
        };

        let content = Self::paragraph_text(paragraph);
        if content.is_empty() {
            return String::new();
        }
        heading_prefix + &content
    }

    fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
        let mut content = String::new();
        for para_child in &paragraph.children {
            if let docx_rs::ParagraphChild::Run(run) = para_child {
                for run_child in &run.children {
                    if let docx_rs::RunChild::Text(text) = run_child {
                        content.push_str(&text.text);
                    }
                }
            }
        }
        content
    }

    fn render_table(table: &docx_rs::Table) -> String {
        let mut rows: Vec<Vec<String>> = Vec::new();

        for table_child in &table.rows {
            let docx_rs::TableChild::TableRow(row) = table_child;
            let mut cells: Vec<String> = Vec::new();
            for row_child in &row.cells {
                let docx_rs::TableRowChild::TableCell(cell) = row_child;
                let mut cell_text = String::new();
                for cell_child in &cell.children {
                    if let docx_rs::TableCellContent::Paragraph(para) = cell_child {
                        let para_text = Self::paragraph_text(para);
                        if !cell_text.is_empty() {
                            cell_text.push(' ');
                        }
                        cell_text.push_str(&para_text);
                    }
                }
                cells.push(cell_text.trim().to_string());
            }
            if !cells.is_empty() {
                rows.push(cells);
            }
        }

        render_pipe_table(&rows)
    }
}

/// Rows → markdown pipe table with a separator after the first row.
pub(crate) fn render_pipe_table(rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let col_count = rows[0].len();
    let mut result = String::new();

    result.push_str("| ");
    result.push_str(&rows[0].join(" | "));
    result.push_str(" |\n|");
    for _ in 0..col_count {
        result.push_str("------|");
    }
    result.push('\n');

    for row in rows.iter().skip(1) {
        result.push_str("| ");
        result.push_str(&row.join(" | "));
        result.push_str(" |\n");
    }

    result.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_table_renders_header_and_rows() {
        let rows = vec![
            vec!["Name".to_string(), "Age".to_string()],
            vec!["Alice".to_string(), "30".to_string()],
        ];
        let table = render_pipe_table(&rows);
        assert!(table.starts_with("| Name | Age |"));
        assert!(table.contains("|------|------|"));
        assert!(table.contains("| Alice | 30 |"));
    }

    #[test]
    fn empty_rows_render_nothing() {
        assert_eq!(render_pipe_table(&[]), "");
    }

    #[test]
    fn round_trip_generated_docx() {
        let docx = docx_rs::Docx::new()
            .add_paragraph(
                docx_rs::Paragraph::new()
                    .add_run(docx_rs::Run::new().add_text("Quarterly review")),
            )
            .add_paragraph(
                docx_rs::Paragraph::new()
                    .add_run(docx_rs::Run::new().add_text("Numbers were solid.")),
            );

        let mut buffer = std::io::Cursor::new(Vec::new());
        docx.build().pack(&mut buffer).expect("pack docx");

        let text = DocxExtractor::extract(buffer.get_ref()).expect("extract");
        assert!(text.contains("Quarterly review"));
        assert!(text.contains("Numbers were solid."));
    }
}
