pub mod chunking;
pub mod extract;
pub mod extractors;
pub mod parser;
pub mod prompts;
pub mod splitter;
pub mod tagging;

pub use chunking::{hash_file, ChunkPipeline};
pub use parser::{DocItem, DocItemKind, DocumentParser, ParsedDocument};
pub use splitter::{estimate_tokens, HybridSplitter};
pub use tagging::{BatchReport, TagPipeline};
