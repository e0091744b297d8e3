//! Format-specific text extraction. Every extractor takes raw bytes and
//! produces markdown-flavored text; tables come out as pipe tables so the
//! downstream chunk classifier can recognize them.

pub mod docx;
pub mod pdf;
pub mod pptx;
pub mod xlsx;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;
pub use pptx::PptxExtractor;
pub use xlsx::XlsxExtractor;
