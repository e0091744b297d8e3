use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::error::{KfError, Result};

use super::docx::render_pipe_table;

pub struct XlsxExtractor;

impl XlsxExtractor {
    const MAX_ROWS: usize = 100_000;

    /// Workbook → one markdown section per sheet, each sheet a pipe table.
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let cursor = Cursor::new(bytes.to_vec());
        let mut workbook = open_workbook_auto_from_rs(cursor)
            .map_err(|e| KfError::Parse(format!("Spreadsheet parse error: {e}")))?;

        let mut text = String::new();

        for (name, range) in workbook.worksheets() {
            let (rows, cols) = range.get_size();

            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&format!("## Sheet: {name}\n\n"));

            if rows == 0 || cols == 0 {
                text.push_str("*(empty sheet)*");
                continue;
            }

            let row_limit = rows.min(Self::MAX_ROWS);
            let mut table_rows: Vec<Vec<String>> = Vec::with_capacity(row_limit);
            for row_idx in 0..row_limit {
                let mut cells: Vec<String> = Vec::with_capacity(cols);
                for col_idx in 0..cols {
                    let value = range.get_value((row_idx as u32, col_idx as u32));
                    cells.push(Self::format_cell(value));
                }
                table_rows.push(cells);
            }

            text.push_str(&render_pipe_table(&table_rows));

            if rows > Self::MAX_ROWS {
                text.push_str(&format!(
                    "\n\n*... truncated (showing {} of {} rows)*",
                    Self::MAX_ROWS,
                    rows
                ));
            }
        }

        Ok(text)
    }

    fn format_cell(cell: Option<&Data>) -> String {
        match cell {
            Some(Data::String(s)) => s.clone(),
            Some(Data::Int(i)) => i.to_string(),
            Some(Data::Float(f)) => {
                let s = format!("{f}");
                if s.contains('.') {
                    s.trim_end_matches('0').trim_end_matches('.').to_string()
                } else {
                    s
                }
            }
            Some(Data::Bool(b)) => b.to_string(),
            Some(Data::DateTime(dt)) => dt.to_string(),
            Some(Data::DateTimeIso(dt)) => dt.to_string(),
            Some(Data::DurationIso(d)) => d.to_string(),
            Some(Data::Empty) | None => String::new(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_cell_values() {
        assert_eq!(
            XlsxExtractor::format_cell(Some(&Data::String("hello".to_string()))),
            "hello"
        );
        assert_eq!(XlsxExtractor::format_cell(Some(&Data::Int(42))), "42");
        assert_eq!(XlsxExtractor::format_cell(Some(&Data::Float(2.50))), "2.5");
        assert_eq!(XlsxExtractor::format_cell(Some(&Data::Bool(true))), "true");
        assert_eq!(XlsxExtractor::format_cell(Some(&Data::Empty)), "");
        assert_eq!(XlsxExtractor::format_cell(None), "");
    }

    #[test]
    fn invalid_bytes_are_a_parse_error() {
        let error = XlsxExtractor::extract(b"definitely not a workbook").unwrap_err();
        assert!(matches!(error, KfError::Parse(_)));
    }
}
