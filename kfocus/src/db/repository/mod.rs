use chrono::{DateTime, Utc};

use crate::error::{KfError, Result};

pub mod documents;
pub mod model_config;
pub mod rules;
pub mod screening;
pub mod sessions;
pub mod settings;
pub mod tags;
pub mod tasks;

pub use documents::DocumentRepository;
pub use model_config::ModelConfigRepository;
pub use rules::RuleRepository;
pub use screening::ScreeningRepository;
pub use sessions::SessionRepository;
pub use settings::SettingsRepository;
pub use tags::TagRepository;
pub use tasks::TaskRepository;

pub(crate) fn parse_dt(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| KfError::Internal(format!("Invalid timestamp '{value}': {e}")))
}

pub(crate) fn parse_dt_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(v) if !v.is_empty() => Ok(Some(parse_dt(&v)?)),
        _ => Ok(None),
    }
}

/// Stored JSON columns are best-effort on read: a corrupt cell becomes
/// `None` rather than poisoning the whole row.
pub(crate) fn parse_json_opt(value: Option<String>) -> Option<serde_json::Value> {
    value.and_then(|v| serde_json::from_str(&v).ok())
}

/// Positional placeholder list `?1, ?2, …` for IN clauses.
pub(crate) fn placeholders(count: usize, start: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", start + i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_positional() {
        assert_eq!(placeholders(3, 1), "?1, ?2, ?3");
        assert_eq!(placeholders(2, 4), "?4, ?5");
        assert_eq!(placeholders(0, 1), "");
    }

    #[test]
    fn parse_dt_round_trip() {
        let now = Utc::now();
        let parsed = parse_dt(&now.to_rfc3339()).unwrap();
        assert_eq!(parsed.timestamp(), now.timestamp());
    }

    #[test]
    fn corrupt_json_reads_as_none() {
        assert!(parse_json_opt(Some("{not json".into())).is_none());
        assert!(parse_json_opt(None).is_none());
        assert!(parse_json_opt(Some("{\"a\":1}".into())).is_some());
    }
}
