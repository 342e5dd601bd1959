//! Integration tests for the pipeline
//!
//! These tests use wiremock to serve a small legislature site and run the
//! full fetch, process and load cycle end-to-end against a temporary
//! database.

use statehouse::config::{Config, CrawlerConfig, HttpConfig, OutputConfig, SessionEntry};
use statehouse::crawler::run_crawl;
use statehouse::graph::load_known_links;
use statehouse::registry::Stage;
use statehouse::storage::{RunStatus, RunStore, SqliteStore};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMMITTEE_LIST: &str = r#"
    <html><body>
        <a href="/Committees/Detail?id=1">Revenue</a>
    </body></html>
"#;

const COMMITTEE: &str = r#"
    <html><body>
        <h1 class="committee-name">Revenue</h1>
        <span class="committee-code">SREV</span>
        <a href="/Bills/Detail?id=5">HB 5</a>
    </body></html>
"#;

const BILL: &str = r#"
    <html><body>
        <span class="bill-number">HB 5</span>
        <h2 class="bill-title">An Act concerning revenue</h2>
        <span class="bill-status">Passed Both Houses</span>
        <span class="last-action-date">1/13/2025 2:39:05 PM</span>
        <a class="sponsor" href="/Committees/Detail?id=1">Revenue</a>
        <a href="/Votes/Detail?id=9">Roll call</a>
    </body></html>
"#;

const VOTE: &str = r#"
    <html><body>
        <span class="motion">Third Reading</span>
        <span class="vote-date">1/14/2025 10:00:00 AM</span>
        <a class="bill-link" href="/Bills/Detail?id=5">HB 5</a>
        <ul class="roll-call">
            <li class="yea">Doe</li>
            <li class="yea">Roe</li>
            <li class="nay">Poe</li>
        </ul>
    </body></html>
"#;

/// Creates a test configuration with one session seeded at the given URL
fn create_test_config(dir: &TempDir, seed: String) -> Config {
    Config {
        crawler: CrawlerConfig {
            min_delay_ms: 10,
            poll_interval_ms: 10,
            join_timeout_secs: 5,
            checkpoint_interval_secs: 60,
            lookup_backoff_ms: 10,
            max_lookup_attempts: 500,
            strict: false,
            timezone: "America/Chicago".to_string(),
        },
        http: HttpConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
            max_attempts: 2,
            backoff_ms: 1,
            recycle_after: 100,
            timeout_secs: 5,
        },
        output: OutputConfig {
            database_path: dir.path().join("statehouse.db"),
            checkpoint_path: dir.path().join("checkpoint.json"),
            known_links_path: dir.path().join("known.json"),
        },
        sessions: vec![SessionEntry {
            name: "103".to_string(),
            seeds: vec![seed],
        }],
    }
}

async fn mount_page(server: &MockServer, page_path: &str, id: Option<&str>, body: &str) {
    let mock = Mock::given(method("GET")).and(path(page_path));
    let mock = match id {
        Some(id) => mock.and(query_param("id", id)),
        None => mock,
    };
    mock.respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_site(server: &MockServer) {
    mount_page(server, "/Committees", None, COMMITTEE_LIST).await;
    mount_page(server, "/Committees/Detail", Some("1"), COMMITTEE).await;
    mount_page(server, "/Bills/Detail", Some("5"), BILL).await;
    mount_page(server, "/Votes/Detail", Some("9"), VOTE).await;
}

#[tokio::test]
async fn test_full_crawl_resolves_references() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, format!("{}/Committees?GA=103", server.uri()));
    let database_path = config.output.database_path.clone();
    let known_links_path = config.output.known_links_path.clone();

    let summary = run_crawl(config, "test-hash", false).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.roots_seeded, 1);
    assert_eq!(summary.failed(), 0);
    // Committee list completes at fetch; committee, bill and vote at load
    assert_eq!(summary.report(Stage::Fetch).unwrap().completed, 1);
    assert_eq!(summary.report(Stage::Load).unwrap().completed, 3);
    assert!(summary.remaining.is_empty());

    let store = SqliteStore::new(&database_path).unwrap();
    let counts = store.entity_counts().unwrap();
    assert_eq!(counts.committees, 1);
    assert_eq!(counts.committee_versions, 1);
    assert_eq!(counts.bills, 1);
    assert_eq!(counts.votes, 1);

    let committee_id: i64 = store
        .conn()
        .query_row("SELECT id FROM committees WHERE code = 'SREV'", [], |row| {
            row.get(0)
        })
        .unwrap();
    let (bill_id, bill_committee, last_action_at): (i64, Option<i64>, Option<String>) = store
        .conn()
        .query_row(
            "SELECT id, committee_id, last_action_at FROM bills WHERE number = 'HB 5'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(bill_committee, Some(committee_id));
    assert_eq!(last_action_at.as_deref(), Some("2025-01-13T14:39:05-06:00"));

    let (vote_bill, yeas, nays): (Option<i64>, i64, i64) = store
        .conn()
        .query_row("SELECT bill_id, yeas, nays FROM votes", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .unwrap();
    assert_eq!(vote_bill, Some(bill_id));
    assert_eq!((yeas, nays), (2, 1));

    let runs = store.latest_runs(1).unwrap();
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].config_hash, "test-hash");
    assert_eq!(runs[0].nodes_completed, 4);

    assert_eq!(load_known_links(&known_links_path).unwrap().len(), 4);
}

#[tokio::test]
async fn test_second_run_skips_known_seeds() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/Committees?GA=103", server.uri());

    run_crawl(create_test_config(&dir, seed.clone()), "hash", false)
        .await
        .unwrap();
    let requests = server.received_requests().await.unwrap().len();
    assert_eq!(requests, 4);

    let summary = run_crawl(create_test_config(&dir, seed), "hash", false)
        .await
        .unwrap();
    assert_eq!(summary.roots_seeded, 0);
    assert_eq!(summary.completed(), 0);
    assert_eq!(server.received_requests().await.unwrap().len(), requests);
}

#[tokio::test]
async fn test_missing_page_fails_only_its_node() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/Committees",
        None,
        r#"<a href="/Committees/Detail?id=1">Revenue</a>
           <a href="/Committees/Detail?id=2">Gone</a>"#,
    )
    .await;
    mount_page(
        &server,
        "/Committees/Detail",
        Some("1"),
        r#"<h1 class="committee-name">Revenue</h1><span class="committee-code">SREV</span>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/Committees/Detail"))
        .and(query_param("id", "2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, format!("{}/Committees?GA=103", server.uri()));
    let database_path = config.output.database_path.clone();

    let summary = run_crawl(config, "hash", false).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.report(Stage::Fetch).unwrap().failed, 1);
    assert!(summary.remaining.is_empty());

    let store = SqliteStore::new(&database_path).unwrap();
    assert_eq!(store.entity_counts().unwrap().committees, 1);
}
