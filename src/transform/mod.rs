//! Transform and validation engine
//!
//! Extracted values are raw strings pulled out of markup. This module turns
//! them into typed, normalized fields through per-key transform functions,
//! and validates finished records against typed schemas.

mod engine;
pub mod functions;
mod validate;

pub use engine::{
    unescape_entities, FieldError, TransformError, TransformFn, TransformOutcome,
    TransformTemplate, Transformer,
};
pub use validate::{validate, ValidationError};
