//! Configuration module for statehouse
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use statehouse::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("statehouse.toml")).unwrap();
//! println!("Politeness delay: {}ms", config.crawler.min_delay_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, HttpConfig, OutputConfig, SessionEntry};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
