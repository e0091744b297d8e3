use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskKind {
    Tagging,
    Multivector,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tagging => write!(f, "TAGGING"),
            Self::Multivector => write!(f, "MULTIVECTOR"),
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TAGGING" => Ok(Self::Tagging),
            "MULTIVECTOR" => Ok(Self::Multivector),
            _ => Err(format!("Unknown task kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    // Claim order: HIGH before MEDIUM before LOW.
    High,
    Medium,
    Low,
}

impl TaskPriority {
    /// Numeric rank used by the claim query's ORDER BY.
    pub fn rank(&self) -> i64 {
        match self {
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            _ => Err(format!("Unknown task priority: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Unknown task status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskResult {
    Success,
    Failure,
}

impl std::fmt::Display for TaskResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

impl std::str::FromStr for TaskResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            _ => Err(format!("Unknown task result: {s}")),
        }
    }
}

/// Detached task snapshot. Workers operate on snapshots; every status
/// change goes back through its own short write transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub task_name: String,
    pub task_type: TaskKind,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub extra_data: Option<serde_json::Value>,
    pub target_file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Task {
    pub fn extra_i64(&self, key: &str) -> Option<i64> {
        self.extra_data.as_ref()?.get(key)?.as_i64()
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra_data.as_ref()?.get(key)?.as_str()
    }
}

/// How a dispatched task ended, from the scheduler's point of view.
/// `Deferred` is not a failure: the task stays PENDING and is reclaimed on
/// a later poll (built-in backpressure while models load).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(String),
    Failed(String),
    Deferred,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_rank_is_total_order() {
        assert!(TaskPriority::High.rank() < TaskPriority::Medium.rank());
        assert!(TaskPriority::Medium.rank() < TaskPriority::Low.rank());
    }

    #[test]
    fn round_trip_display_parse() {
        for kind in [TaskKind::Tagging, TaskKind::Multivector] {
            assert_eq!(kind.to_string().parse::<TaskKind>().unwrap(), kind);
        }
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn extra_data_accessors() {
        let task = Task {
            id: 1,
            task_name: "tag one file".into(),
            task_type: TaskKind::Tagging,
            priority: TaskPriority::High,
            status: TaskStatus::Pending,
            result: None,
            extra_data: Some(serde_json::json!({
                "screening_result_id": 12,
                "file_path": "/tmp/a.pdf",
            })),
            target_file_path: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            start_time: None,
            error_message: None,
        };
        assert_eq!(task.extra_i64("screening_result_id"), Some(12));
        assert_eq!(task.extra_str("file_path"), Some("/tmp/a.pdf"));
        assert_eq!(task.extra_i64("missing"), None);
    }
}
