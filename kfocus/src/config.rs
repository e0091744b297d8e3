use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embeddings: EmbeddingsConfig,
    pub chunking: ChunkingConfig,
    pub tagging: TaggingConfig,
    pub scheduler: SchedulerConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub model_host: ModelHostConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Data root; the SQLite file, the vector table file, the parse cache
    /// and the log directory all live under it.
    pub data_dir: PathBuf,
    /// Explicit SQLite path override (`--db-path`); defaults to
    /// `<data_dir>/knowledge-focus.db`.
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    /// Process-wide vector dimension. Mixed dimensions never share a table.
    pub dimensions: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    /// Minimum body length before a chunk gets an LLM retrieval summary.
    pub summary_min_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaggingConfig {
    /// Character budget of the content summary handed to the tagger.
    pub summary_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub high_poll_interval_secs: u64,
    pub all_poll_interval_secs: u64,
    pub batch_file_delay_ms: u64,
    /// Window after pinning during which a completed TAGGING task chains a
    /// MULTIVECTOR task for the same file.
    pub pin_chain_window_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Per-source character budget in the assembled RAG block.
    pub source_preview_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub config_ttl_secs: u64,
    pub tag_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelHostConfig {
    pub enabled: bool,
    pub port: u16,
    pub command: Option<String>,
    pub hf_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("KFOCUS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: parse_env_or("KFOCUS_PORT", 60315),
            },
            storage: StorageConfig {
                data_dir: env::var("KF_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data")),
                db_path: env::var("KFOCUS_DB_PATH").ok().map(PathBuf::from),
            },
            embeddings: EmbeddingsConfig {
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 1024),
                batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 32),
            },
            chunking: ChunkingConfig {
                max_tokens: parse_env_or("CHUNK_MAX_TOKENS", 512),
                summary_min_chars: parse_env_or("CHUNK_SUMMARY_MIN_CHARS", 50),
            },
            tagging: TaggingConfig {
                summary_chars: parse_env_or("TAGGING_SUMMARY_CHARS", 3000),
            },
            scheduler: SchedulerConfig {
                high_poll_interval_secs: parse_env_or("HIGH_POLL_INTERVAL_SECS", 2),
                all_poll_interval_secs: parse_env_or("ALL_POLL_INTERVAL_SECS", 5),
                batch_file_delay_ms: parse_env_or("BATCH_FILE_DELAY_MS", 500),
                pin_chain_window_hours: parse_env_or("PIN_CHAIN_WINDOW_HOURS", 24),
            },
            retrieval: RetrievalConfig {
                top_k: parse_env_or("RAG_TOP_K", 5),
                source_preview_chars: parse_env_or("RAG_SOURCE_PREVIEW_CHARS", 1000),
            },
            cache: CacheConfig {
                config_ttl_secs: parse_env_or("CONFIG_CACHE_TTL_SECS", 300),
                tag_ttl_secs: parse_env_or("TAG_CACHE_TTL_SECS", 300),
            },
            model_host: ModelHostConfig {
                enabled: parse_env_or("MODEL_HOST_ENABLED", false),
                port: parse_env_or("MODEL_HOST_PORT", 60316),
                command: env::var("MODEL_HOST_COMMAND").ok(),
                hf_endpoint: env::var("HF_ENDPOINT").ok(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("knowledge-focus.db"))
    }

    pub fn vector_db_path(&self) -> PathBuf {
        self.storage.data_dir.join("vectors.db")
    }

    pub fn parse_cache_dir(&self) -> PathBuf {
        self.storage.data_dir.join("docling_cache")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.storage.data_dir.join("logs")
    }
}

/// Extensions routed through the office/PDF converters for tagging.
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &["pdf", "pptx", "docx", "xlsx", "xls"];

/// Extensions read directly as (lossy) UTF-8 text.
pub const PLAIN_TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Every extension the chunking pipeline accepts.
pub fn is_supported_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_lowercase();
    CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()) || PLAIN_TEXT_EXTENSIONS.contains(&ext.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_without_env() {
        std::env::remove_var("KFOCUS_PORT");
        std::env::remove_var("KF_DATA_DIR");
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 60315);
        assert_eq!(config.embeddings.dimensions, 1024);
        assert_eq!(config.chunking.max_tokens, 512);
        assert_eq!(config.scheduler.pin_chain_window_hours, 24);
    }

    #[test]
    #[serial]
    fn data_dir_from_env() {
        std::env::remove_var("KFOCUS_DB_PATH");
        std::env::set_var("KF_DATA_DIR", "/tmp/kf-test");
        let config = Config::default();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/kf-test/knowledge-focus.db"));
        assert_eq!(
            config.parse_cache_dir(),
            PathBuf::from("/tmp/kf-test/docling_cache")
        );
        std::env::remove_var("KF_DATA_DIR");
    }

    #[test]
    #[serial]
    fn db_path_override_wins() {
        std::env::set_var("KFOCUS_DB_PATH", "/elsewhere/kf.db");
        let config = Config::default();
        assert_eq!(config.db_path(), PathBuf::from("/elsewhere/kf.db"));
        std::env::remove_var("KFOCUS_DB_PATH");
    }

    #[test]
    fn supported_extensions() {
        assert!(is_supported_extension(Path::new("a/b/report.PDF")));
        assert!(is_supported_extension(Path::new("notes.md")));
        assert!(!is_supported_extension(Path::new("movie.mp4")));
        assert!(!is_supported_extension(Path::new("no_extension")));
    }

    #[test]
    #[serial]
    fn invalid_numeric_env_falls_back() {
        std::env::set_var("__KF_TEST_PORT", "not-a-number");
        let value: u16 = parse_env_or("__KF_TEST_PORT", 60315);
        assert_eq!(value, 60315);
        std::env::remove_var("__KF_TEST_PORT");
    }
}
