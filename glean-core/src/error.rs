//! Error types for the Glean research core.
//!
//! Uses `thiserror` for public API error types. Only configuration loading
//! and corpus loading surface errors to callers; provider and strategist
//! failures are recovered inside a research session.

use std::path::PathBuf;

/// Top-level error type for the Glean core library.
#[derive(Debug, thiserror::Error)]
pub enum GleanError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Strategist error: {0}")]
    Strategist(#[from] StrategistError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from a single external data provider call.
///
/// A provider error never fails a round: the fetcher records it against the
/// provider and contributes zero sources for that slot.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider '{provider}' timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Provider '{provider}' request failed: {message}")]
    Request { provider: String, message: String },

    #[error("Provider '{provider}' task aborted: {message}")]
    Aborted { provider: String, message: String },
}

impl ProviderError {
    /// Name of the provider that produced this error.
    pub fn provider(&self) -> &str {
        match self {
            Self::Timeout { provider, .. }
            | Self::Request { provider, .. }
            | Self::Aborted { provider, .. } => provider,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors from the strategist (plan, reflect, refine).
#[derive(Debug, Clone, thiserror::Error)]
pub enum StrategistError {
    #[error("Strategist response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Strategist unavailable: {message}")]
    Unavailable { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from loading an offline source corpus.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Corpus file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Corpus file {path} is malformed: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// A type alias for results using the top-level `GleanError`.
pub type Result<T> = std::result::Result<T, GleanError>;
