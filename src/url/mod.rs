//! URL handling module
//!
//! This module provides URL normalization, link resolution, domain
//! extraction and the loose URL comparison used when matching references
//! between pages.

mod domain;
mod normalize;

pub use domain::{domain_of, extract_domain};
pub use normalize::{looks_like_url, normalize_url, path_and_query, resolve_link, urls_match};
