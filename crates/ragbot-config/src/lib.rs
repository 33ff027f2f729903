//! Layered configuration for Ragbot.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

pub use ragbot_api::{
    DEFAULT_BASE_URL as DEFAULT_API_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_TEMPERATURE,
};
pub use ragbot_retrieval::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_TARGET_SOURCE_CHUNKS};
pub use ragbot_session::DEFAULT_HISTORY_TURNS;

use ragbot_types::{ConfigError, Credential};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PERSIST_DIR: &str = "./persist";
pub const DEFAULT_CORPUS_DIR: &str = "./retrieval";
pub const DEFAULT_BIND: &str = "0.0.0.0:5002";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RETRIEVAL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CONCURRENT_ASKS: usize = 32;
pub const DEFAULT_MAX_SESSIONS: usize = 1024;
pub const DEFAULT_SESSION_IDLE_TTL_SECS: u64 = 24 * 60 * 60;

/// Resolved configuration for the chatbot service.
#[derive(Debug, Clone)]
pub struct ChatbotConfig {
    /// Shared key; when set, one global retriever serves every session.
    pub openai_api_key: Option<Credential>,
    pub api_base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    pub embedding_model: String,
    pub persist_dir: PathBuf,
    pub corpus_dir: PathBuf,
    pub target_source_chunks: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub history_turns: usize,
    pub bind: String,
    pub llm_timeout: Duration,
    pub retrieval_timeout: Duration,
    pub max_concurrent_asks: usize,
    pub max_sessions: usize,
    pub session_idle_ttl: Duration,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub embedding_model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    pub persist_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub corpus_dir: Option<PathBuf>,
    pub target_source_chunks: Option<usize>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSettings {
    pub history_turns: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub retrieval_timeout_secs: Option<u64>,
    pub max_concurrent_asks: Option<usize>,
    pub max_sessions: Option<usize>,
    pub session_idle_ttl_secs: Option<u64>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub persist_dir: Option<PathBuf>,
    pub corpus_dir: Option<PathBuf>,
}

impl ChatbotConfig {
    /// Load configuration from the process environment and
    /// `<config_dir>/config.toml`, applying precedence rules.
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let settings = load_settings_file(&config_dir().join("config.toml"))?;
        Self::resolve(overrides, settings, |key| std::env::var(key).ok())
    }

    /// Resolve a configuration from explicit sources. `env` looks up an
    /// environment variable by name.
    pub fn resolve(
        overrides: CliOverrides,
        settings: SettingsFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Empty values count as unset.
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let openai_api_key = env("CHATBOT_OPENAI_API_KEY")
            .or(settings.api.api_key.filter(|k| !k.trim().is_empty()))
            .map(Credential::new);

        let api_base_url = env("OPENAI_API_BASE_URL")
            .or(settings.api.base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let chat_model = env("CHATBOT_MODEL")
            .or(settings.api.model)
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());

        let embedding_model = env("CHATBOT_EMBEDDING_MODEL")
            .or(settings.api.embedding_model)
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());

        let temperature = settings.api.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(invalid("api.temperature", "must be between 0.0 and 2.0"));
        }

        let persist_dir = overrides
            .persist_dir
            .or_else(|| env("PERSIST_DIRECTORY").map(PathBuf::from))
            .or(settings.storage.persist_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PERSIST_DIR));

        let corpus_dir = overrides
            .corpus_dir
            .or_else(|| env("RETRIEVAL_DIRECTORY").map(PathBuf::from))
            .or(settings.retrieval.corpus_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CORPUS_DIR));

        let target_source_chunks = match env("TARGET_SOURCE_CHUNKS") {
            Some(raw) => parse_positive("TARGET_SOURCE_CHUNKS", &raw)?,
            None => settings
                .retrieval
                .target_source_chunks
                .unwrap_or(DEFAULT_TARGET_SOURCE_CHUNKS),
        };
        if target_source_chunks == 0 {
            return Err(invalid("retrieval.target_source_chunks", "must be at least 1"));
        }

        let chunk_size = settings.retrieval.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let chunk_overlap = settings.retrieval.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP);
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(invalid(
                "retrieval.chunk_overlap",
                "chunk_size must be positive and larger than chunk_overlap",
            ));
        }

        let server = settings.server;
        let bind = overrides
            .bind
            .or_else(|| env("RAGBOT_BIND"))
            .or(server.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        Ok(ChatbotConfig {
            openai_api_key,
            api_base_url,
            chat_model,
            temperature,
            embedding_model,
            persist_dir,
            corpus_dir,
            target_source_chunks,
            chunk_size,
            chunk_overlap,
            history_turns: settings.chat.history_turns.unwrap_or(DEFAULT_HISTORY_TURNS),
            bind,
            llm_timeout: Duration::from_secs(
                server.llm_timeout_secs.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS),
            ),
            retrieval_timeout: Duration::from_secs(
                server
                    .retrieval_timeout_secs
                    .unwrap_or(DEFAULT_RETRIEVAL_TIMEOUT_SECS),
            ),
            max_concurrent_asks: server
                .max_concurrent_asks
                .unwrap_or(DEFAULT_MAX_CONCURRENT_ASKS)
                .max(1),
            max_sessions: server.max_sessions.unwrap_or(DEFAULT_MAX_SESSIONS).max(1),
            session_idle_ttl: Duration::from_secs(
                server
                    .session_idle_ttl_secs
                    .unwrap_or(DEFAULT_SESSION_IDLE_TTL_SECS),
            ),
        })
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| invalid(key, &format!("'{raw}' is not a positive integer ({e})")))
}

/// Get the Ragbot config directory path (~/.ragbot/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RAGBOT_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ragbot")
}

/// Load and parse a TOML settings file. A missing file yields defaults;
/// an unreadable or malformed one is an error.
pub fn load_settings_file(path: &Path) -> Result<SettingsFile, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    };
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Ok(SettingsFile::default());
        }
        Err(e) => return Err(parse_error(e.to_string())),
    };
    toml::from_str(&content).map_err(|e| parse_error(e.to_string()))
}
