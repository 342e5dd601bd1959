//! Extraction engine
//!
//! Applies a template of named selectors to an HTML document and produces a
//! flat map from template keys to extracted values.
//!
//! # Example
//!
//! ```
//! use statehouse::extract::{ExtractTemplate, Extractor, FieldSelector};
//!
//! let template = ExtractTemplate::new()
//!     .field("title", FieldSelector::text("h1"))
//!     .field("links", FieldSelector::attr("a", "href"));
//!
//! let html = r#"<h1>Bills</h1><a href="/Bills/Detail?id=1">HB1</a>"#;
//! let values = Extractor::new(false).extract(&template, html).unwrap();
//! assert_eq!(values["title"][0], "Bills");
//! assert_eq!(values["links"][0], "/Bills/Detail?id=1");
//! ```

mod engine;
mod selector;

pub use engine::{ExtractError, Extractor};
pub use selector::{ExtractTemplate, FieldSelector, SelectorFn};
