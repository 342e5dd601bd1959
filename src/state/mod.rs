//! State module for tracking pipeline progress
//!
//! This module provides state management for graph nodes and domains during a crawl.
//!
//! # Components
//!
//! - `PipelineState`: Tracks where a node is in the fetch, process and load pipeline
//! - `DomainState`: Tracks per-domain request timing for rate limiting

mod domain_state;
mod pipeline_state;

// Re-export main types
pub use domain_state::DomainState;
pub use pipeline_state::PipelineState;
