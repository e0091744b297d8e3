use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Processing,
    Done,
    Error,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown document status: {s}")),
        }
    }
}

/// One row per file ever submitted to the chunking pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub file_path: String,
    pub file_hash: String,
    pub docling_json_path: Option<String>,
    pub status: DocumentStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Grain of the dual representation: parents carry the parser's raw text
/// for answer synthesis; `image_context` pairs are synthesized for
/// cross-modal recall. Never "mixed" — mixed parser chunks are split
/// before they reach storage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    #[default]
    Text,
    Image,
    Table,
    ImageContext,
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
            Self::Table => write!(f, "table"),
            Self::ImageContext => write!(f, "image_context"),
        }
    }
}

impl std::str::FromStr for ChunkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "table" => Ok(Self::Table),
            "image_context" => Ok(Self::ImageContext),
            _ => Err(format!("Unknown chunk type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentChunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_type: ChunkType,
    /// Parser-original text. Context enrichment goes only into the child
    /// summary, never back into this field.
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildChunk {
    pub id: i64,
    pub parent_chunk_id: i64,
    /// LLM summary optimized for retrieval; this is the vectorized text.
    pub retrieval_content: String,
    /// 16-hex opaque join key into the vector store.
    pub vector_id: String,
}

/// Insert shape for a parent chunk (id assigned by the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewParentChunk {
    pub document_id: i64,
    pub chunk_type: ChunkType,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

/// Insert shape for a child chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChildChunk {
    pub parent_chunk_id: i64,
    pub retrieval_content: String,
    pub vector_id: String,
}

/// Row shape in the vector store table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub vector_id: String,
    pub vector: Vec<f32>,
    pub parent_chunk_id: i64,
    pub document_id: i64,
    /// First ≤500 chars of the child's retrieval content, kept beside the
    /// vector so search hits render without a round trip.
    pub retrieval_content_preview: String,
}

/// ANN hit before hydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub vector_id: String,
    pub parent_chunk_id: i64,
    pub document_id: i64,
    pub retrieval_content_preview: String,
    /// Cosine distance, non-negative, lower is closer.
    pub distance: f32,
}

const HEX_ALPHABET: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// New 16-hex vector id.
pub fn generate_vector_id() -> String {
    nanoid::nanoid!(16, &HEX_ALPHABET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_id_is_16_hex() {
        let id = generate_vector_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn vector_ids_are_distinct() {
        let a = generate_vector_id();
        let b = generate_vector_id();
        assert_ne!(a, b);
    }

    #[test]
    fn chunk_type_round_trip() {
        for t in [
            ChunkType::Text,
            ChunkType::Image,
            ChunkType::Table,
            ChunkType::ImageContext,
        ] {
            assert_eq!(t.to_string().parse::<ChunkType>().unwrap(), t);
        }
        assert!("mixed".parse::<ChunkType>().is_err());
    }
}
