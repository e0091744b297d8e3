use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    User,
    #[default]
    Llm,
    System,
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Llm => write!(f, "llm"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for TagKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "llm" => Ok(Self::Llm),
            "system" => Ok(Self::System),
            _ => Err(format!("Unknown tag kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TagKind,
}

/// Canonical tag-name form: inner whitespace becomes `_`, leading and
/// trailing non-word characters are stripped. Hyphens inside compound
/// words survive.
pub fn normalize_tag_name(raw: &str) -> String {
    let collapsed: String = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '-';
    collapsed
        .trim_matches(|c: char| !is_word(c))
        .to_string()
}

/// Weighted entry for the tag cloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWeight {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TagKind,
    pub weight: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagSearchOperator {
    #[default]
    And,
    Or,
}

impl TagSearchOperator {
    pub fn as_fts_join(&self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_joins_whitespace_with_underscore() {
        assert_eq!(normalize_tag_name("project  management"), "project_management");
        assert_eq!(normalize_tag_name("deep\tlearning"), "deep_learning");
    }

    #[test]
    fn normalize_strips_boundary_punctuation() {
        assert_eq!(normalize_tag_name("  #rust! "), "rust");
        assert_eq!(normalize_tag_name("\"quoted\""), "quoted");
    }

    #[test]
    fn normalize_keeps_hyphens_in_compounds() {
        assert_eq!(normalize_tag_name("man-in-loop"), "man-in-loop");
    }

    #[test]
    fn normalize_keeps_cjk() {
        assert_eq!(normalize_tag_name("机器学习"), "机器学习");
    }

    #[test]
    fn normalize_empty_and_punctuation_only() {
        assert_eq!(normalize_tag_name(""), "");
        assert_eq!(normalize_tag_name("!!!"), "");
    }

    #[test]
    fn operator_join_strings() {
        assert_eq!(TagSearchOperator::And.as_fts_join(), " AND ");
        assert_eq!(TagSearchOperator::Or.as_fts_join(), " OR ");
    }
}
