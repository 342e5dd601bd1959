//! Statehouse: a resumable legislative-site scraper
//!
//! This crate crawls a legislature's website, extracts bills, legislators,
//! committees and votes with CSS-selector templates, resolves references
//! between pages through a shared link graph, and loads the results into
//! SQLite. Work flows through three stages (fetch, process, load) that
//! communicate over queues, and the graph is checkpointed so an interrupted
//! crawl can resume where it stopped.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod graph;
pub mod output;
pub mod registry;
pub mod state;
pub mod storage;
pub mod transform;
pub mod url;

use thiserror::Error;

/// Main error type for Statehouse operations
#[derive(Debug, Error)]
pub enum StatehouseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] extract::ExtractError),

    #[error("Transform error: {0}")]
    Transform(#[from] transform::TransformError),

    #[error("Validation error: {0}")]
    Validation(#[from] transform::ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] graph::CheckpointError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::PipelineState,
        to: state::PipelineState,
    },

    #[error("No {stage} template registered for {page_type}")]
    MissingTemplate {
        page_type: registry::PageType,
        stage: registry::Stage,
    },

    #[error("Node {0} not found in graph")]
    NodeNotFound(graph::NodeId),

    #[error("No usable content extracted from {url}")]
    EmptyResult { url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Statehouse operations
pub type Result<T> = std::result::Result<T, StatehouseError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use graph::{Graph, Node, NodeId, SharedGraph};
pub use registry::{PageType, Registry, Stage};
pub use state::{DomainState, PipelineState};
pub use url::{extract_domain, normalize_url, urls_match};
