use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metadata;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    #[default]
    Pending,
    Processed,
    Failed,
    Ignored,
}

impl std::fmt::Display for ScreeningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processed => write!(f, "processed"),
            Self::Failed => write!(f, "failed"),
            Self::Ignored => write!(f, "ignored"),
        }
    }
}

impl std::str::FromStr for ScreeningStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "ignored" => Ok(Self::Ignored),
            _ => Err(format!("Unknown screening status: {s}")),
        }
    }
}

/// A file's metadata record as produced by the external watcher. The input
/// unit to both pipelines; `(file_path, file_hash)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileScreening {
    pub id: i64,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub extension: Option<String>,
    pub file_hash: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: Option<DateTime<Utc>>,
    pub category_id: Option<i64>,
    pub matched_rules: Option<serde_json::Value>,
    pub extra_metadata: Option<Metadata>,
    pub status: ScreeningStatus,
    pub error_message: Option<String>,
    pub tagged_time: Option<DateTime<Utc>>,
    /// Sorted, comma-separated tag ids; source of truth for the FTS mirror.
    pub tags_display_ids: Option<String>,
    pub task_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileScreening {
    pub fn tag_ids(&self) -> Vec<i64> {
        match &self.tags_display_ids {
            Some(csv) => csv
                .split(',')
                .filter_map(|t| t.trim().parse::<i64>().ok())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Watcher submission payload; everything else on the row is derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningSubmission {
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub extension: Option<String>,
    pub file_hash: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: Option<DateTime<Utc>>,
    pub category_id: Option<i64>,
    pub matched_rules: Option<serde_json::Value>,
    pub extra_metadata: Option<Metadata>,
    pub task_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_ids_parses_sorted_csv() {
        let mut row = sample_row();
        row.tags_display_ids = Some("3,17,42".to_string());
        assert_eq!(row.tag_ids(), vec![3, 17, 42]);
    }

    #[test]
    fn tag_ids_empty_when_unset() {
        let row = sample_row();
        assert!(row.tag_ids().is_empty());
    }

    fn sample_row() -> FileScreening {
        FileScreening {
            id: 1,
            file_path: "/tmp/notes.txt".into(),
            file_name: "notes.txt".into(),
            file_size: 42,
            extension: Some("txt".into()),
            file_hash: Some("abc".into()),
            created_time: None,
            modified_time: None,
            category_id: None,
            matched_rules: None,
            extra_metadata: None,
            status: ScreeningStatus::Pending,
            error_message: None,
            tagged_time: None,
            tags_display_ids: None,
            task_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
