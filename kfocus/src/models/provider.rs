use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named ability bound to exactly one model configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Text,
    Vision,
    ToolUse,
    Embedding,
    StructuredOutput,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Text,
        Capability::Vision,
        Capability::ToolUse,
        Capability::Embedding,
        Capability::StructuredOutput,
    ];
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Vision => write!(f, "vision"),
            Self::ToolUse => write!(f, "tool_use"),
            Self::Embedding => write!(f, "embedding"),
            Self::StructuredOutput => write!(f, "structured_output"),
        }
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "vision" => Ok(Self::Vision),
            "tool_use" => Ok(Self::ToolUse),
            "embedding" => Ok(Self::Embedding),
            "structured_output" => Ok(Self::StructuredOutput),
            _ => Err(format!("Unknown capability: {s}")),
        }
    }
}

/// Wire shapes the discovery endpoint understands. They differ only in the
/// auth header and the JSON path to the models list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Ollama,
    LmStudio,
    Anthropic,
    Google,
    Grok,
    Groq,
}

impl ProviderKind {
    /// Default API base for providers that did not configure one.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Ollama => "http://localhost:11434/v1",
            Self::LmStudio => "http://localhost:1234/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta",
            Self::Grok => "https://api.x.ai/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::OpenRouter => write!(f, "openrouter"),
            Self::Ollama => write!(f, "ollama"),
            Self::LmStudio => write!(f, "lmstudio"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Google => write!(f, "google"),
            Self::Grok => write!(f, "grok"),
            Self::Groq => write!(f, "groq"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            "lmstudio" => Ok(Self::LmStudio),
            "anthropic" => Ok(Self::Anthropic),
            "google" => Ok(Self::Google),
            "grok" => Ok(Self::Grok),
            "groq" => Ok(Self::Groq),
            _ => Err(format!("Unknown provider kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProvider {
    pub id: i64,
    pub kind: ProviderKind,
    pub display_name: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub use_proxy: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfiguration {
    pub id: i64,
    pub provider_id: i64,
    pub model_identifier: String,
    pub display_name: String,
    pub max_context_length: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub capabilities: Vec<Capability>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One configuration per capability; the mapping the gateway resolves at
/// call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityAssignment {
    pub id: i64,
    pub capability: Capability,
    pub model_configuration_id: i64,
    pub updated_at: DateTime<Utc>,
}

/// Everything a pipeline needs to actually call a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedModel {
    pub model_identifier: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub use_proxy: bool,
    pub max_context_length: Option<u32>,
    pub max_output_tokens: Option<u32>,
}

/// Normalized discovery output, provider shape already flattened away.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredModel {
    pub model_identifier: String,
    pub display_name: String,
    pub max_context_length: Option<u32>,
    pub max_output_tokens: Option<u32>,
}

/// Per-capability probe verdicts (user-initiated test matrix).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CapabilityProbeReport {
    pub text: Option<bool>,
    pub vision: Option<bool>,
    pub tool_use: Option<bool>,
    pub embedding: Option<bool>,
    pub structured_output: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(cap.to_string().parse::<Capability>().unwrap(), cap);
        }
    }

    #[test]
    fn provider_kind_parse_is_case_insensitive() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("GROQ".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);
        assert!("mystery".parse::<ProviderKind>().is_err());
    }
}
