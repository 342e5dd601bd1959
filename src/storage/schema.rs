//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Statehouse database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    nodes_completed INTEGER NOT NULL DEFAULT 0,
    nodes_failed INTEGER NOT NULL DEFAULT 0
);

-- Members of either chamber, keyed by their detail page
CREATE TABLE IF NOT EXISTS legislators (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    party TEXT,
    chamber TEXT,
    district TEXT,
    phone TEXT,
    email TEXT,
    session TEXT,
    updated_at TEXT NOT NULL
);

-- Committees keyed by their code (or URL when the site shows no code)
CREATE TABLE IF NOT EXISTS committees (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Committee name/URL history; the open version has no end session
CREATE TABLE IF NOT EXISTS committee_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    committee_id INTEGER NOT NULL REFERENCES committees(id),
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    start_session TEXT NOT NULL,
    end_session TEXT,
    UNIQUE(committee_id, start_session)
);

CREATE INDEX IF NOT EXISTS idx_committee_versions_committee ON committee_versions(committee_id);

CREATE TABLE IF NOT EXISTS bills (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session TEXT NOT NULL,
    number TEXT NOT NULL,
    title TEXT,
    status TEXT,
    last_action_at TEXT,
    url TEXT NOT NULL,
    committee_id INTEGER REFERENCES committees(id),
    updated_at TEXT NOT NULL,
    UNIQUE(session, number)
);

CREATE INDEX IF NOT EXISTS idx_bills_committee ON bills(committee_id);

CREATE TABLE IF NOT EXISTS bill_sponsors (
    bill_id INTEGER NOT NULL REFERENCES bills(id),
    legislator_id INTEGER NOT NULL REFERENCES legislators(id),
    PRIMARY KEY (bill_id, legislator_id)
);

CREATE TABLE IF NOT EXISTS votes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    bill_id INTEGER REFERENCES bills(id),
    motion TEXT,
    voted_at TEXT,
    yeas INTEGER NOT NULL,
    nays INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_votes_bill ON votes(bill_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
