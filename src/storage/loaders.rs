//! Per-page-type upserts
//!
//! Each loader validates its loader record against a typed schema and
//! upserts it. Upserts are keyed on natural keys so loading the same page
//! twice updates the existing row instead of inserting a duplicate.

use crate::storage::traits::StorageResult;
use crate::transform::validate;
use crate::url::resolve_link;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct LegislatorRecord {
    pub url: String,
    #[serde(default)]
    pub session: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub chamber: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitteeRecord {
    pub url: String,
    #[serde(default)]
    pub session: Option<String>,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillRecord {
    pub url: String,
    #[serde(default)]
    pub session: Option<String>,
    pub number: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_action_at: Option<String>,
    /// Sponsor links that point at member pages
    #[serde(default)]
    pub member_urls: Vec<String>,
    /// Resolved through the link graph
    #[serde(default)]
    pub committee_id: Option<Vec<i64>>,
    /// Sponsors resolved through the link graph
    #[serde(default)]
    pub legislator_id: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRecord {
    pub url: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub bill_id: Option<Vec<i64>>,
    #[serde(default)]
    pub motion: Option<String>,
    #[serde(default)]
    pub voted_at: Option<String>,
    pub yeas: i64,
    pub nays: i64,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn first_id(ids: &Option<Vec<i64>>) -> Option<i64> {
    ids.as_ref().and_then(|ids| ids.first().copied())
}

pub fn load_legislator(conn: &Connection, params: &Map<String, Value>) -> StorageResult<i64> {
    let record: LegislatorRecord = validate(params)?;
    upsert_legislator(conn, &record)
}

pub fn load_committee(conn: &Connection, params: &Map<String, Value>) -> StorageResult<i64> {
    let record: CommitteeRecord = validate(params)?;
    upsert_committee(conn, &record)
}

pub fn load_bill(conn: &Connection, params: &Map<String, Value>) -> StorageResult<i64> {
    let record: BillRecord = validate(params)?;
    upsert_bill(conn, &record)
}

pub fn load_vote(conn: &Connection, params: &Map<String, Value>) -> StorageResult<i64> {
    let record: VoteRecord = validate(params)?;
    upsert_vote(conn, &record)
}

fn upsert_legislator(conn: &Connection, record: &LegislatorRecord) -> StorageResult<i64> {
    let id: i64 = conn.query_row(
        "INSERT INTO legislators
            (url, first_name, last_name, party, chamber, district, phone, email, session, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(url) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            party = COALESCE(excluded.party, legislators.party),
            chamber = COALESCE(excluded.chamber, legislators.chamber),
            district = COALESCE(excluded.district, legislators.district),
            phone = COALESCE(excluded.phone, legislators.phone),
            email = COALESCE(excluded.email, legislators.email),
            session = COALESCE(excluded.session, legislators.session),
            updated_at = excluded.updated_at
         RETURNING id",
        params![
            record.url,
            record.first_name,
            record.last_name,
            record.party,
            record.chamber,
            record.district,
            record.phone,
            record.email,
            record.session,
            now(),
        ],
        |row| row.get(0),
    )?;
    debug!(id, url = %record.url, "Upserted legislator");
    Ok(id)
}

/// Orders session names numerically when both parse, textually otherwise
fn session_order(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// One row of a committee's name/URL history
struct CommitteeVersion {
    id: i64,
    name: String,
    url: String,
    start_session: String,
}

impl CommitteeVersion {
    fn matches(&self, record: &CommitteeRecord) -> bool {
        self.name == record.name && self.url == record.url
    }
}

fn committee_versions(conn: &Connection, committee_id: i64) -> StorageResult<Vec<CommitteeVersion>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, url, start_session FROM committee_versions
         WHERE committee_id = ?1",
    )?;
    let versions = stmt
        .query_map(params![committee_id], |row| {
            Ok(CommitteeVersion {
                id: row.get(0)?,
                name: row.get(1)?,
                url: row.get(2)?,
                start_session: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(versions)
}

/// Upserts a committee and records its name/URL as of the record's session
///
/// Sessions may arrive in any order. A record for the latest session known
/// for the committee closes the open version and updates the committee row;
/// a record for an earlier session is slotted into the history as a closed
/// version and leaves the committee row alone. Records that repeat the
/// version covering their session change nothing.
fn upsert_committee(conn: &Connection, record: &CommitteeRecord) -> StorageResult<i64> {
    let code = record.code.as_deref().unwrap_or(&record.url);
    let session = record.session.as_deref().unwrap_or("");

    let id: i64 = conn.query_row(
        "INSERT INTO committees (code, name, url, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(code) DO UPDATE SET updated_at = excluded.updated_at
         RETURNING id",
        params![code, record.name, record.url, now()],
        |row| row.get(0),
    )?;

    let versions = committee_versions(conn, id)?;
    let previous = versions
        .iter()
        .filter(|v| session_order(&v.start_session, session) == Ordering::Less)
        .max_by(|a, b| session_order(&a.start_session, &b.start_session));
    let next = versions
        .iter()
        .filter(|v| session_order(&v.start_session, session) == Ordering::Greater)
        .min_by(|a, b| session_order(&a.start_session, &b.start_session));

    if let Some(current) = versions.iter().find(|v| v.start_session == session) {
        if !current.matches(record) {
            conn.execute(
                "UPDATE committee_versions SET name = ?1, url = ?2 WHERE id = ?3",
                params![record.name, record.url, current.id],
            )?;
        }
    } else if previous.is_some_and(|v| v.matches(record)) {
        // The version running up to this session already covers it
    } else if let Some(following) = next.filter(|v| v.matches(record)) {
        conn.execute(
            "UPDATE committee_versions SET start_session = ?1 WHERE id = ?2",
            params![session, following.id],
        )?;
        close_version(conn, previous, session)?;
    } else {
        conn.execute(
            "INSERT INTO committee_versions (committee_id, name, url, start_session, end_session)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                record.name,
                record.url,
                session,
                next.map(|v| v.start_session.as_str())
            ],
        )?;
        close_version(conn, previous, session)?;
        debug!(id, code, session, "Recorded committee version");
    }

    if next.is_none() {
        conn.execute(
            "UPDATE committees SET name = ?1, url = ?2 WHERE id = ?3",
            params![record.name, record.url, id],
        )?;
    } else {
        debug!(id, code, session, "Committee record is older than its latest session");
    }

    Ok(id)
}

/// Ends a version at `session`
fn close_version(
    conn: &Connection,
    version: Option<&CommitteeVersion>,
    session: &str,
) -> StorageResult<()> {
    if let Some(version) = version {
        conn.execute(
            "UPDATE committee_versions SET end_session = ?1 WHERE id = ?2",
            params![session, version.id],
        )?;
    }
    Ok(())
}

/// Upserts a bill and replaces its sponsor list
///
/// Sponsors come from graph lookups when available; member sponsor links
/// that the graph could not resolve are matched against loaded legislators.
fn upsert_bill(conn: &Connection, record: &BillRecord) -> StorageResult<i64> {
    let session = record.session.as_deref().unwrap_or("");

    let id: i64 = conn.query_row(
        "INSERT INTO bills
            (session, number, title, status, last_action_at, url, committee_id, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(session, number) DO UPDATE SET
            title = COALESCE(excluded.title, bills.title),
            status = COALESCE(excluded.status, bills.status),
            last_action_at = COALESCE(excluded.last_action_at, bills.last_action_at),
            url = excluded.url,
            committee_id = COALESCE(excluded.committee_id, bills.committee_id),
            updated_at = excluded.updated_at
         RETURNING id",
        params![
            session,
            record.number,
            record.title,
            record.status,
            record.last_action_at,
            record.url,
            first_id(&record.committee_id),
            now(),
        ],
        |row| row.get(0),
    )?;

    let member_urls: Vec<String> = record
        .member_urls
        .iter()
        .filter_map(|href| resolve_link(href, &record.url))
        .collect();
    let mut sponsors = record.legislator_id.clone().unwrap_or_default();
    if sponsors.len() < member_urls.len() {
        for legislator in legislators_by_url(conn, &member_urls)? {
            if !sponsors.contains(&legislator) {
                sponsors.push(legislator);
            }
        }
    }

    conn.execute("DELETE FROM bill_sponsors WHERE bill_id = ?1", params![id])?;
    for legislator in &sponsors {
        conn.execute(
            "INSERT OR IGNORE INTO bill_sponsors (bill_id, legislator_id) VALUES (?1, ?2)",
            params![id, legislator],
        )?;
    }

    debug!(id, number = %record.number, sponsors = sponsors.len(), "Upserted bill");
    Ok(id)
}

/// Finds loaded legislators by absolute URL
fn legislators_by_url(conn: &Connection, urls: &[String]) -> StorageResult<Vec<i64>> {
    if urls.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; urls.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT url, id FROM legislators WHERE url IN ({})",
        placeholders
    ))?;
    let rows: HashMap<String, i64> = stmt
        .query_map(params_from_iter(urls), |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut found = Vec::new();
    for url in urls {
        match rows.get(url) {
            Some(id) => found.push(*id),
            None => warn!(url = %url, "Sponsor not found among loaded legislators"),
        }
    }
    Ok(found)
}

fn upsert_vote(conn: &Connection, record: &VoteRecord) -> StorageResult<i64> {
    let id: i64 = conn.query_row(
        "INSERT INTO votes (url, bill_id, motion, voted_at, yeas, nays, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(url) DO UPDATE SET
            bill_id = COALESCE(excluded.bill_id, votes.bill_id),
            motion = excluded.motion,
            voted_at = excluded.voted_at,
            yeas = excluded.yeas,
            nays = excluded.nays,
            updated_at = excluded.updated_at
         RETURNING id",
        params![
            record.url,
            first_id(&record.bill_id),
            record.motion,
            record.voted_at,
            record.yeas,
            record.nays,
            now(),
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}
