//! # Glean Core
//!
//! Core library for the Glean research engine.
//! Provides the multi-round research orchestrator, the fault-tolerant
//! parallel provider fetcher, cross-round source deduplication, relevance
//! ranking, budgeted source selection, configuration, and error types.

pub mod config;
pub mod error;
pub mod research;

// Re-export commonly used types at the crate root.
pub use config::{GleanConfig, config_exists, load_config};
pub use error::{GleanError, Result};
pub use research::{
    ProgressSink, ProviderClient, ResearchEvent, ResearchOrchestrator, SessionResult, Source,
    Strategist,
};
