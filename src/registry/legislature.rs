//! Templates for a typical state legislature site
//!
//! Member, committee and bill listings link to detail pages; bill pages link
//! to their roll calls. Sponsor links on a bill point at either a member or
//! a committee, and vote pages link back to their bill.

use super::{LoadSpec, LookupDirection, PageType, ProcessTemplate, Registry, StateLookup};
use crate::extract::{ExtractTemplate, FieldSelector};
use crate::storage::{load_bill, load_committee, load_legislator, load_vote};
use crate::transform::functions::{
    email, id_list, identity, member_name, phone, text, text_list, timestamp,
};
use chrono_tz::Tz;
use scraper::{Html, Selector};
use serde_json::{json, Value};

/// Data key the fetch templates store discovered links under
pub const LINKS_KEY: &str = "links";

fn links(query: &str) -> ExtractTemplate {
    ExtractTemplate::new().field(LINKS_KEY, FieldSelector::attr(query, "href"))
}

fn lookup(key: &str, source_key: &str, target_type: PageType) -> StateLookup {
    StateLookup {
        key: key.to_string(),
        source_key: source_key.to_string(),
        target_type,
        target_key: key.to_string(),
        direction: LookupDirection::Ancestors,
        transform: id_list(),
    }
}

/// Counts roll-call entries
///
/// An empty `.roll-call` container is a vote with no entries either way.
/// None when the page has neither entries nor a container.
fn vote_counts(document: &Html) -> Result<Option<Value>, String> {
    let yea = Selector::parse("li.yea").map_err(|e| e.to_string())?;
    let nay = Selector::parse("li.nay").map_err(|e| e.to_string())?;
    let roll_call = Selector::parse(".roll-call").map_err(|e| e.to_string())?;

    let yeas = document.select(&yea).count();
    let nays = document.select(&nay).count();
    if yeas + nays == 0 && document.select(&roll_call).next().is_none() {
        return Ok(None);
    }
    Ok(Some(json!({"yeas": yeas, "nays": nays})))
}

/// Builds the registry for a legislature site whose dates are local to `tz`
pub fn legislature_registry(tz: Tz) -> Registry {
    let member = ProcessTemplate::new()
        .field("name", FieldSelector::text("h1.member-name"), member_name())
        .field("district", FieldSelector::text("span.district"), text())
        .field("phone", FieldSelector::text("span.phone"), phone())
        .field("email", FieldSelector::attr("a.email", "href"), email());

    let committee = ProcessTemplate::new()
        .field("name", FieldSelector::text("h1.committee-name"), text())
        .field("code", FieldSelector::text("span.committee-code"), text());

    let bill = ProcessTemplate::new()
        .field("number", FieldSelector::text("span.bill-number"), text())
        .field("title", FieldSelector::text("h2.bill-title"), text())
        .field("status", FieldSelector::text("span.bill-status"), text())
        .field(
            "last_action_at",
            FieldSelector::text("span.last-action-date"),
            timestamp(tz),
        )
        .field(
            "sponsor_urls",
            FieldSelector::attr("a.sponsor", "href"),
            text_list(),
        )
        .field(
            "member_urls",
            FieldSelector::attr(r#"a.sponsor[href*="/Members/Detail"]"#, "href"),
            text_list(),
        )
        .lookup(lookup("committee_id", "sponsor_urls", PageType::Committee))
        .lookup(lookup("legislator_id", "sponsor_urls", PageType::Legislator));

    let vote = ProcessTemplate::new()
        .field("motion", FieldSelector::text("span.motion"), text())
        .field("voted_at", FieldSelector::text("span.vote-date"), timestamp(tz))
        .field("counts", FieldSelector::func(vote_counts), identity())
        .field("bill_urls", FieldSelector::attr("a.bill-link", "href"), text_list())
        .lookup(lookup("bill_id", "bill_urls", PageType::Bill));

    Registry::new()
        .route("/Members", PageType::LegislatorList)
        .route("/Members/Detail", PageType::Legislator)
        .route("/Committees", PageType::CommitteeList)
        .route("/Committees/Detail", PageType::Committee)
        .route("/Bills", PageType::BillList)
        .route("/Bills/Detail", PageType::Bill)
        .route("/Votes/Detail", PageType::Vote)
        .with_fetch(PageType::LegislatorList, links(r#"a[href*="/Members/Detail"]"#))
        .with_fetch(PageType::CommitteeList, links(r#"a[href*="/Committees/Detail"]"#))
        .with_fetch(PageType::Committee, links(r#"a[href*="/Bills/Detail"]"#))
        .with_fetch(PageType::BillList, links(r#"a[href*="/Bills/Detail"]"#))
        .with_fetch(PageType::Bill, links(r#"a[href*="/Votes/Detail"]"#))
        .with_process(PageType::Legislator, member)
        .with_process(PageType::Committee, committee)
        .with_process(PageType::Bill, bill)
        .with_process(PageType::Vote, vote)
        .with_load(
            PageType::Legislator,
            LoadSpec {
                id_key: "legislator_id",
                load: load_legislator,
            },
        )
        .with_load(
            PageType::Committee,
            LoadSpec {
                id_key: "committee_id",
                load: load_committee,
            },
        )
        .with_load(
            PageType::Bill,
            LoadSpec {
                id_key: "bill_id",
                load: load_bill,
            },
        )
        .with_load(
            PageType::Vote,
            LoadSpec {
                id_key: "vote_id",
                load: load_vote,
            },
        )
}
