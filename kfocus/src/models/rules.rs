use serde::{Deserialize, Serialize};

/// Coarse file class shown in the shell and attached to screening rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileCategory {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

/// Extension → category link; the watcher classifies files with the
/// flattened map derived from these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileExtensionMapping {
    pub id: i64,
    pub extension: String,
    pub category_id: i64,
    pub description: Option<String>,
    pub priority: RulePriority,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RulePriority {
    High,
    #[default]
    Medium,
    Low,
}

impl std::fmt::Display for RulePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for RulePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Unknown rule priority: {s}")),
        }
    }
}

/// What a filter rule's pattern is matched against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterRuleType {
    #[default]
    Filename,
    Extension,
    Folder,
}

impl std::fmt::Display for FilterRuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filename => write!(f, "filename"),
            Self::Extension => write!(f, "extension"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

impl std::str::FromStr for FilterRuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "filename" => Ok(Self::Filename),
            "extension" => Ok(Self::Extension),
            "folder" => Ok(Self::Folder),
            _ => Err(format!("Unknown filter rule type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RulePatternType {
    #[default]
    Regex,
    Glob,
    Keyword,
}

impl std::fmt::Display for RulePatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regex => write!(f, "regex"),
            Self::Glob => write!(f, "glob"),
            Self::Keyword => write!(f, "keyword"),
        }
    }
}

impl std::str::FromStr for RulePatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regex" => Ok(Self::Regex),
            "glob" => Ok(Self::Glob),
            "keyword" => Ok(Self::Keyword),
            _ => Err(format!("Unknown rule pattern type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Include,
    Exclude,
    Label,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Include => write!(f, "include"),
            Self::Exclude => write!(f, "exclude"),
            Self::Label => write!(f, "label"),
        }
    }
}

impl std::str::FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "include" => Ok(Self::Include),
            "exclude" => Ok(Self::Exclude),
            "label" => Ok(Self::Label),
            _ => Err(format!("Unknown rule action: {s}")),
        }
    }
}

/// Screening filter rule: the watcher applies these to candidate files
/// before anything reaches the pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFilterRule {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: FilterRuleType,
    pub pattern: String,
    pub pattern_type: RulePatternType,
    pub action: RuleAction,
    pub priority: RulePriority,
    pub enabled: bool,
    pub category_id: Option<i64>,
    pub extra_data: Option<serde_json::Value>,
}

/// Insert shape for a filter rule (id assigned by the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFilterRule {
    pub name: String,
    pub description: Option<String>,
    pub rule_type: FilterRuleType,
    pub pattern: String,
    pub pattern_type: RulePatternType,
    pub action: RuleAction,
    #[serde(default)]
    pub priority: RulePriority,
    pub category_id: Option<i64>,
    pub extra_data: Option<serde_json::Value>,
}

/// How a project rule recognizes a project root.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRuleType {
    NamePattern,
    Structure,
}

impl std::fmt::Display for ProjectRuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NamePattern => write!(f, "name_pattern"),
            Self::Structure => write!(f, "structure"),
        }
    }
}

impl std::str::FromStr for ProjectRuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name_pattern" => Ok(Self::NamePattern),
            "structure" => Ok(Self::Structure),
            _ => Err(format!("Unknown project rule type: {s}")),
        }
    }
}

/// Project-folder recognition rule. Structure rules carry their marker
/// list in `indicators` (e.g. `{"structure_markers": [".git"]}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecognitionRule {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: ProjectRuleType,
    pub pattern: String,
    pub priority: RulePriority,
    pub indicators: Option<serde_json::Value>,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_enums_round_trip() {
        for priority in [RulePriority::High, RulePriority::Medium, RulePriority::Low] {
            assert_eq!(priority.to_string().parse::<RulePriority>().unwrap(), priority);
        }
        for action in [RuleAction::Include, RuleAction::Exclude, RuleAction::Label] {
            assert_eq!(action.to_string().parse::<RuleAction>().unwrap(), action);
        }
        for pattern_type in [
            RulePatternType::Regex,
            RulePatternType::Glob,
            RulePatternType::Keyword,
        ] {
            assert_eq!(
                pattern_type.to_string().parse::<RulePatternType>().unwrap(),
                pattern_type
            );
        }
        for rule_type in [ProjectRuleType::NamePattern, ProjectRuleType::Structure] {
            assert_eq!(
                rule_type.to_string().parse::<ProjectRuleType>().unwrap(),
                rule_type
            );
        }
    }

    #[test]
    fn unknown_rule_values_are_errors() {
        assert!("urgent".parse::<RulePriority>().is_err());
        assert!("rename".parse::<RuleAction>().is_err());
        assert!("fuzzy".parse::<RulePatternType>().is_err());
    }

    #[test]
    fn new_filter_rule_defaults_priority_to_medium() {
        let rule: NewFilterRule = serde_json::from_value(serde_json::json!({
            "name": "skip temp files",
            "rule_type": "filename",
            "pattern": "~$*",
            "pattern_type": "glob",
            "action": "exclude",
        }))
        .unwrap();
        assert_eq!(rule.priority, RulePriority::Medium);
    }
}
