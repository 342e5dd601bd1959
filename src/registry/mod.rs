//! Page registry
//!
//! The registry maps each page type to the templates used at each pipeline
//! stage, and classifies discovered URLs into page types.
//!
//! # Components
//!
//! - `PageType` / `Stage`: the keys of the registry
//! - `ProcessTemplate`: extraction fields with their transforms, plus
//!   lookups that resolve references to other pages through the graph
//! - `LoadSpec`: the upsert for a page type and the data key its row id is
//!   stored under

mod legislature;

pub use legislature::legislature_registry;

use crate::extract::{ExtractTemplate, FieldSelector};
use crate::storage::LoadFn;
use crate::transform::{TransformFn, TransformTemplate};
use crate::url::path_and_query;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kinds of pages the crawler knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageType {
    LegislatorList,
    Legislator,
    CommitteeList,
    Committee,
    BillList,
    Bill,
    Vote,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LegislatorList => "LEGISLATOR_LIST",
            Self::Legislator => "LEGISLATOR",
            Self::CommitteeList => "COMMITTEE_LIST",
            Self::Committee => "COMMITTEE",
            Self::BillList => "BILL_LIST",
            Self::Bill => "BILL",
            Self::Vote => "VOTE",
        }
    }

    pub fn all() -> [PageType; 7] {
        [
            Self::LegislatorList,
            Self::Legislator,
            Self::CommitteeList,
            Self::Committee,
            Self::BillList,
            Self::Bill,
            Self::Vote,
        ]
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Process,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetch => "FETCH",
            Self::Process => "PROCESS",
            Self::Load => "LOAD",
        };
        f.write_str(name)
    }
}

/// Where a state lookup searches before falling back to the whole graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupDirection {
    Ancestors,
    Descendants,
}

/// One extracted field and its transform
#[derive(Clone)]
pub struct ProcessField {
    pub key: String,
    pub selector: FieldSelector,
    pub transform: TransformFn,
}

/// Resolves URLs in an extracted field to data stored on other nodes
///
/// For each URL in `source_key`, the node of `target_type` with a matching
/// URL is located and its `target_key` collected. The collected values pass
/// through `transform` and are stored under `key`.
#[derive(Clone)]
pub struct StateLookup {
    pub key: String,
    pub source_key: String,
    pub target_type: PageType,
    pub target_key: String,
    pub direction: LookupDirection,
    pub transform: TransformFn,
}

impl fmt::Debug for StateLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateLookup")
            .field("key", &self.key)
            .field("source_key", &self.source_key)
            .field("target_type", &self.target_type)
            .field("target_key", &self.target_key)
            .field("direction", &self.direction)
            .finish()
    }
}

/// Content template of a page type
#[derive(Clone, Default)]
pub struct ProcessTemplate {
    pub fields: Vec<ProcessField>,
    pub lookups: Vec<StateLookup>,
}

impl ProcessTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(
        mut self,
        key: impl Into<String>,
        selector: FieldSelector,
        transform: TransformFn,
    ) -> Self {
        self.fields.push(ProcessField {
            key: key.into(),
            selector,
            transform,
        });
        self
    }

    pub fn lookup(mut self, lookup: StateLookup) -> Self {
        self.lookups.push(lookup);
        self
    }

    /// Splits the template into its extraction and transform halves
    pub fn split(&self) -> (ExtractTemplate, TransformTemplate) {
        let mut extract = ExtractTemplate::new();
        let mut transform = TransformTemplate::new();
        for field in &self.fields {
            extract = extract.field(field.key.clone(), field.selector.clone());
            transform.push(field.key.clone(), field.transform.clone());
        }
        (extract, transform)
    }
}

impl fmt::Debug for ProcessTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessTemplate")
            .field("fields", &self.fields.iter().map(|p| &p.key).collect::<Vec<_>>())
            .field("lookups", &self.lookups)
            .finish()
    }
}

/// Load stage entry of a page type
#[derive(Clone, Copy)]
pub struct LoadSpec {
    /// Data key the loaded row id is stored under on the node
    pub id_key: &'static str,
    pub load: LoadFn,
}

impl fmt::Debug for LoadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadSpec").field("id_key", &self.id_key).finish()
    }
}

/// A registry entry resolved for one stage
#[derive(Debug, Clone, Copy)]
pub enum Processor<'a> {
    Fetch(&'a ExtractTemplate),
    Process(&'a ProcessTemplate),
    Load(&'a LoadSpec),
}

/// URL fragment that identifies a page type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub pattern: String,
    pub page_type: PageType,
}

/// Page type → stage → template
#[derive(Debug, Default)]
pub struct Registry {
    routes: Vec<Route>,
    fetch: HashMap<PageType, ExtractTemplate>,
    process: HashMap<PageType, ProcessTemplate>,
    load: HashMap<PageType, LoadSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: impl Into<String>, page_type: PageType) -> Self {
        self.routes.push(Route {
            pattern: pattern.into(),
            page_type,
        });
        self
    }

    pub fn with_fetch(mut self, page_type: PageType, template: ExtractTemplate) -> Self {
        self.fetch.insert(page_type, template);
        self
    }

    pub fn with_process(mut self, page_type: PageType, template: ProcessTemplate) -> Self {
        self.process.insert(page_type, template);
        self
    }

    pub fn with_load(mut self, page_type: PageType, spec: LoadSpec) -> Self {
        self.load.insert(page_type, spec);
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Looks up the processor of a page type for a stage
    pub fn get_processor(&self, page_type: PageType, stage: Stage) -> Option<Processor<'_>> {
        match stage {
            Stage::Fetch => self.fetch.get(&page_type).map(Processor::Fetch),
            Stage::Process => self.process.get(&page_type).map(Processor::Process),
            Stage::Load => self.load.get(&page_type).map(Processor::Load),
        }
    }

    pub fn fetch_template(&self, page_type: PageType) -> Option<&ExtractTemplate> {
        self.fetch.get(&page_type)
    }

    pub fn process_template(&self, page_type: PageType) -> Option<&ProcessTemplate> {
        self.process.get(&page_type)
    }

    pub fn load_spec(&self, page_type: PageType) -> Option<&LoadSpec> {
        self.load.get(&page_type)
    }

    /// True if pages of this type carry content for the Process stage
    pub fn has_process(&self, page_type: PageType) -> bool {
        self.process.contains_key(&page_type)
    }

    /// Classifies a URL by its path and query
    ///
    /// Matching is a case-insensitive substring test; when several routes
    /// match, the longest pattern wins.
    pub fn classify_url(&self, url: &str) -> Option<PageType> {
        let target = path_and_query(url);
        self.routes
            .iter()
            .filter(|route| target.contains(&route.pattern.to_lowercase()))
            .max_by_key(|route| route.pattern.len())
            .map(|route| route.page_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::functions;

    fn create_test_registry() -> Registry {
        Registry::new()
            .route("/Bills", PageType::BillList)
            .route("/Bills/Detail", PageType::Bill)
            .route("/Votes/Detail", PageType::Vote)
            .with_fetch(
                PageType::BillList,
                ExtractTemplate::new().field("links", FieldSelector::attr("a", "href")),
            )
            .with_process(
                PageType::Bill,
                ProcessTemplate::new().field(
                    "number",
                    FieldSelector::text("span.bill-number"),
                    functions::text(),
                ),
            )
    }

    #[test]
    fn test_classify_longest_match_wins() {
        let registry = create_test_registry();
        assert_eq!(
            registry.classify_url("https://example.com/Bills/Detail?id=1"),
            Some(PageType::Bill)
        );
        assert_eq!(
            registry.classify_url("https://example.com/Bills?GA=103"),
            Some(PageType::BillList)
        );
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let registry = create_test_registry();
        assert_eq!(
            registry.classify_url("https://example.com/legis/bills/detail?ID=1"),
            Some(PageType::Bill)
        );
        assert_eq!(registry.classify_url("https://example.com/About"), None);
    }

    #[test]
    fn test_get_processor() {
        let registry = create_test_registry();
        assert!(matches!(
            registry.get_processor(PageType::BillList, Stage::Fetch),
            Some(Processor::Fetch(_))
        ));
        assert!(matches!(
            registry.get_processor(PageType::Bill, Stage::Process),
            Some(Processor::Process(_))
        ));
        assert!(registry.get_processor(PageType::Bill, Stage::Load).is_none());
        assert!(registry.has_process(PageType::Bill));
        assert!(!registry.has_process(PageType::BillList));
    }

    #[test]
    fn test_split_template() {
        let template = ProcessTemplate::new()
            .field("a", FieldSelector::text("h1"), functions::text())
            .field("b", FieldSelector::attr("a", "href"), functions::text_list());

        let (extract, transform) = template.split();
        assert_eq!(extract.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(transform.get("a").is_some());
        assert!(transform.get("b").is_some());
    }

    #[test]
    fn test_page_type_serde_names() {
        let json = serde_json::to_string(&PageType::CommitteeList).unwrap();
        assert_eq!(json, "\"COMMITTEE_LIST\"");
        for page_type in PageType::all() {
            let name = serde_json::to_string(&page_type).unwrap();
            assert_eq!(name.trim_matches('"'), page_type.as_str());
        }
    }
}
