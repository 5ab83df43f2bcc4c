use crate::rag::EntityAlias;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_INDEX_PATH: &str = "data/vector_index";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable {key}: {reason}")]
    InvalidValue {
        /// Name of the offending variable.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// Configuration was already installed in the global cache.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the RAG service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token used for both the embedding and completion endpoints.
    pub openai_api_key: String,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Chat completion model identifier.
    pub openai_model: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Dimensionality of the vectors stored in the index.
    pub embedding_dimension: usize,
    /// Timeout applied to non-streaming completions, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout applied to streaming completions, in seconds.
    pub stream_timeout_secs: u64,
    /// Upper bound on prompt and query length, in characters.
    pub max_message_length: usize,
    /// Upper bound on system prompt length, in characters.
    pub max_system_message_length: usize,
    /// Location of the persisted index; `None` keeps the index in memory only.
    pub index_path: Option<PathBuf>,
    /// Chunk window size, in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks, in characters.
    pub chunk_overlap: usize,
    /// Minimum similarity a retrieved chunk needs to reach the prompt.
    pub min_similarity: f32,
    /// Top-K used when a request does not provide one.
    pub default_top_k: usize,
    /// Largest top-K a request may ask for.
    pub max_top_k: usize,
    /// Short-name to full-name table used to enrich retrieval queries.
    pub entity_aliases: Vec<EntityAlias>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Optional log file path.
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup, validating as we go.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let index_path = match vars.raw("INDEX_PATH") {
            None => Some(PathBuf::from(DEFAULT_INDEX_PATH)),
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(PathBuf::from(value.trim())),
        };

        let config = Self {
            openai_api_key: vars.required("OPENAI_API_KEY")?,
            openai_base_url: vars.string_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            openai_model: vars.string_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            embedding_model: vars.string_or("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_dimension: vars.parsed_or("EMBEDDING_DIMENSION", 1536)?,
            request_timeout_secs: vars.parsed_or("REQUEST_TIMEOUT", 30)?,
            stream_timeout_secs: vars.parsed_or("STREAM_TIMEOUT", 60)?,
            max_message_length: vars.parsed_or("MAX_MESSAGE_LENGTH", 10_000)?,
            max_system_message_length: vars.parsed_or("MAX_SYSTEM_MESSAGE_LENGTH", 5_000)?,
            index_path,
            chunk_size: vars.parsed_or("CHUNK_SIZE", 1000)?,
            chunk_overlap: vars.parsed_or("CHUNK_OVERLAP", 200)?,
            min_similarity: vars.parsed_or("RAG_MIN_SIMILARITY", 0.3)?,
            default_top_k: vars.parsed_or("RAG_DEFAULT_TOP_K", 3)?,
            max_top_k: vars.parsed_or("RAG_MAX_TOP_K", 10)?,
            entity_aliases: match vars.optional("ENTITY_ALIASES") {
                Some(value) => EntityAlias::parse_list(&value)
                    .map_err(|reason| invalid("ENTITY_ALIASES", reason))?,
                None => Vec::new(),
            },
            server_port: vars.parsed_optional("SERVER_PORT")?,
            log_file: vars.optional("RAG_LOG_FILE").map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(invalid("EMBEDDING_DIMENSION", "must be greater than zero"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("CHUNK_SIZE", "must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(invalid("CHUNK_OVERLAP", "must be smaller than CHUNK_SIZE"));
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(invalid("RAG_MIN_SIMILARITY", "must be within [0, 1]"));
        }
        if self.max_top_k == 0 {
            return Err(invalid("RAG_MAX_TOP_K", "must be greater than zero"));
        }
        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(invalid("RAG_DEFAULT_TOP_K", "must be within [1, RAG_MAX_TOP_K]"));
        }
        if self.request_timeout_secs == 0 || self.stream_timeout_secs == 0 {
            return Err(invalid("REQUEST_TIMEOUT", "timeouts must be greater than zero"));
        }
        Ok(())
    }

    /// Emit the non-secret parts of the configuration at debug level.
    pub fn log_summary(&self) {
        tracing::debug!(
            base_url = %self.openai_base_url,
            model = %self.openai_model,
            embedding_model = %self.embedding_model,
            dimension = self.embedding_dimension,
            index_path = ?self.index_path,
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            min_similarity = self.min_similarity,
            aliases = self.entity_aliases.len(),
            server_port = ?self.server_port,
            "Loaded configuration"
        );
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.raw(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed_optional<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|value| value.parse().map_err(|err: T::Err| invalid(key, err)))
            .transpose()
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parsed_optional(key)?.unwrap_or(default))
    }
}

fn invalid(key: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from `.env` and the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}
