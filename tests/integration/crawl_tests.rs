//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end against a SQLite database in a temp directory.

use pagewalk::config::{parse_config, Config};
use pagewalk::crawler::{crawl, FetchStatus, Fetcher, HttpFetcher, PageRef, TracingObserver};
use pagewalk::state::{CrawlState, PageState};
use pagewalk::storage::{RunStatus, SqliteStorage, Storage};
use pagewalk::CrawlPhase;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG_HASH: &str = "integration-test";

/// Creates a test configuration crawling the mock server's quotes pages
fn create_test_config(base_url: &str, db_path: &Path, site_extra: &str) -> Config {
    build_config(db_path, "", &format!("{}/page/1/", base_url), site_extra)
}

/// Same as `create_test_config` with extra `[fetch]` keys and any start URL
fn build_config(db_path: &Path, fetch_extra: &str, start_url: &str, site_extra: &str) -> Config {
    parse_config(&format!(
        r#"
[crawler]
concurrency = 4
checkpoint-interval = 1

[fetch]
timeout-ms = 2000
max-retries = 2
backoff-base-ms = 10
backoff-max-ms = 50
{fetch_extra}

[user-agent]
crawler-name = "TestWalker"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db}"

[[site]]
id = "quotes"
start-urls = ["{start}"]
{extra}

[site.selectors]
record = ".quote"
next-page = ".pager .next > a"

[[site.selectors.field]]
name = "text"
selector = ".text"

[[site.selectors.field]]
name = "author"
selector = ".author"

[[site.selectors.field]]
name = "tags"
selector = ".tag"
all = true
"#,
        db = db_path.display(),
        fetch_extra = fetch_extra,
        start = start_url,
        extra = site_extra,
    ))
    .expect("Test config should be valid")
}

/// Two quotes per page; links to the next page unless `n == last`
fn quotes_page(n: u32, last: u32) -> String {
    let next = if n < last {
        format!(r#"<li class="next"><a href="/page/{}/">Next →</a></li>"#, n + 1)
    } else {
        String::new()
    };
    format!(
        r#"<html><head><title>Quotes {n}</title></head><body>
        <div class="quote">
          <span class="text">First quote on page {n}</span>
          <small class="author">Author {n}</small>
          <a class="tag" href="/tag/a/">a</a><a class="tag" href="/tag/b/">b</a>
        </div>
        <div class="quote">
          <span class="text">Second quote on page {n}</span>
          <small class="author">Author {n}</small>
        </div>
        <nav><ul class="pager">{next}</ul></nav>
        </body></html>"#,
        n = n,
        next = next
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

/// Mounts pages `1..=last` of a pagination chain, each expected exactly once
async fn mount_chain(server: &MockServer, pages: impl IntoIterator<Item = u32>, last: u32) {
    for n in pages {
        Mock::given(method("GET"))
            .and(path(format!("/page/{}/", n)))
            .respond_with(html(quotes_page(n, last)))
            .expect(1)
            .mount(server)
            .await;
    }
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("crawl.db")
}

#[tokio::test]
async fn test_crawls_pagination_chain() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_chain(&server, 1..=3, 3).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &db_path(&dir), "");

    let summary = crawl(&config, CONFIG_HASH, false, CancellationToken::new())
        .await
        .expect("Crawl should succeed");

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.pages_visited, 3);
    assert_eq!(summary.records_extracted, 6);
    assert_eq!(summary.pages_failed, 0);
    assert!(!summary.cancelled);

    let storage = SqliteStorage::new(&db_path(&dir)).unwrap();
    assert_eq!(storage.count_records().unwrap(), 6);
    assert_eq!(storage.count_pages_by_state(PageState::Processed).unwrap(), 3);

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, CONFIG_HASH);

    let checkpoint = storage.load_latest_checkpoint(run.id).unwrap().unwrap();
    assert!(checkpoint.completed);
    assert_eq!(checkpoint.visited.len(), 3);
}

#[tokio::test]
async fn test_not_found_page_fails_without_retry() {
    let server = MockServer::start().await;
    mount_chain(&server, 1..=1, 2).await;

    Mock::given(method("GET"))
        .and(path("/page/2/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &db_path(&dir), "");

    let summary = crawl(&config, CONFIG_HASH, false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.failed[0].status, FetchStatus::HttpError(404));
    assert_eq!(summary.failed[0].attempts, 1);

    let storage = SqliteStorage::new(&db_path(&dir)).unwrap();
    assert_eq!(storage.count_pages_by_state(PageState::DeadLink).unwrap(), 1);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;

    // Mounted first, so it answers the first two requests
    Mock::given(method("GET"))
        .and(path("/page/1/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_chain(&server, 1..=1, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &db_path(&dir), "");

    let summary = crawl(&config, CONFIG_HASH, false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_failed, 0);
    assert_eq!(summary.records_extracted, 2);

    let storage = SqliteStorage::new(&db_path(&dir)).unwrap();
    assert_eq!(storage.count_records().unwrap(), 2);
}

#[tokio::test]
async fn test_robots_disallowed_page_is_not_fetched() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /page/2/").await;
    mount_chain(&server, 1..=1, 3).await;

    Mock::given(method("GET"))
        .and(path("/page/2/"))
        .respond_with(html(quotes_page(2, 3)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &db_path(&dir), "");

    let summary = crawl(&config, CONFIG_HASH, false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.failed[0].status, FetchStatus::Disallowed);
    assert_eq!(summary.failed[0].attempts, 0);
}

#[tokio::test]
async fn test_max_pages_stops_pagination() {
    let server = MockServer::start().await;
    mount_chain(&server, 1..=2, 5).await;

    Mock::given(method("GET"))
        .and(path("/page/3/"))
        .respond_with(html(quotes_page(3, 5)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &db_path(&dir), "max-pages = 2");

    let summary = crawl(&config, CONFIG_HASH, false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.pages_visited, 2);
}

#[tokio::test]
async fn test_resume_skips_visited_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page/1/"))
        .respond_with(html(quotes_page(1, 3)))
        .expect(0)
        .mount(&server)
        .await;
    mount_chain(&server, 2..=3, 3).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &db_path(&dir), "");

    // A previous run visited page 1 and was cancelled with page 2 pending
    let run_id = {
        let page = |n: u32| {
            let url = Url::parse(&format!("{}/page/{}/", server.uri(), n)).unwrap();
            PageRef::new("quotes", url, n).unwrap()
        };

        let mut state = CrawlState::new();
        state.enqueue(vec![page(1)]);
        state.dispatch(1).unwrap();
        state.complete(page(1).dedup_key()).unwrap();
        state.enqueue(vec![page(2)]);

        let mut storage = SqliteStorage::new(&db_path(&dir)).unwrap();
        let run_id = storage.create_run(CONFIG_HASH).unwrap();
        storage.save_checkpoint(run_id, &state.snapshot()).unwrap();
        storage.finish_run(run_id, RunStatus::Cancelled).unwrap();
        run_id
    };

    let summary = crawl(&config, CONFIG_HASH, false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.pages_visited, 2);
    assert_eq!(summary.records_extracted, 4);

    let storage = SqliteStorage::new(&db_path(&dir)).unwrap();
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.id, run_id);
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_fresh_run_ignores_checkpoint() {
    let server = MockServer::start().await;
    mount_chain(&server, 1..=1, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &db_path(&dir), "");

    let stale_run = {
        let url = Url::parse(&format!("{}/page/1/", server.uri())).unwrap();
        let mut state = CrawlState::new();
        state.enqueue(vec![PageRef::new("quotes", url.clone(), 1).unwrap()]);
        state.dispatch(1).unwrap();
        state.complete(PageRef::new("quotes", url, 1).unwrap().dedup_key()).unwrap();

        let mut storage = SqliteStorage::new(&db_path(&dir)).unwrap();
        let run_id = storage.create_run(CONFIG_HASH).unwrap();
        storage.save_checkpoint(run_id, &state.snapshot()).unwrap();
        run_id
    };

    let summary = crawl(&config, CONFIG_HASH, true, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.pages_visited, 1);

    let storage = SqliteStorage::new(&db_path(&dir)).unwrap();
    assert_ne!(storage.get_latest_run().unwrap().unwrap().id, stale_run);
}

#[tokio::test]
async fn test_cancelled_crawl_exits_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page/1/"))
        .respond_with(html(quotes_page(1, 1)))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &db_path(&dir), "");

    let token = CancellationToken::new();
    token.cancel();

    let summary = crawl(&config, CONFIG_HASH, false, token).await.unwrap();
    assert_eq!(summary.phase, CrawlPhase::Cancelled);
    assert!(summary.cancelled);
    assert_eq!(summary.pages_visited, 0);

    let storage = SqliteStorage::new(&db_path(&dir)).unwrap();
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    let checkpoint = storage.load_latest_checkpoint(run.id).unwrap().unwrap();
    assert_eq!(checkpoint.pending.len(), 1);
}

#[tokio::test]
async fn test_per_host_limit_holds_below_global_budget() {
    const PAGES: u32 = 4;
    const PAGE_DELAY: Duration = Duration::from_millis(200);

    let server = MockServer::start().await;
    for n in 1..=PAGES {
        Mock::given(method("GET"))
            .and(path(format!("/page/{}/", n)))
            .respond_with(html(quotes_page(n, n)).set_delay(PAGE_DELAY))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let config = build_config(
        &db_path(&dir),
        "per-host-concurrency = 1",
        &format!("{}/page/{{page}}/", server.uri()),
        &format!("start-pages = {}", PAGES),
    );
    assert_eq!(config.crawler.concurrency, 4);

    let started = Instant::now();
    let summary = crawl(&config, CONFIG_HASH, false, CancellationToken::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.pages_visited, u64::from(PAGES));
    // One request at a time against the host, even with room in the budget
    assert!(
        elapsed >= PAGE_DELAY * PAGES,
        "pages overlapped: {} pages took {:?}",
        PAGES,
        elapsed
    );
}

#[tokio::test]
async fn test_too_many_requests_waits_for_retry_after() {
    let server = MockServer::start().await;

    // Mounted first, so it answers the first request only
    Mock::given(method("GET"))
        .and(path("/page/1/"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_chain(&server, 1..=1, 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &db_path(&dir), "");
    let fetcher = HttpFetcher::new(&config.user_agent, Arc::new(TracingObserver)).unwrap();

    let url = Url::parse(&format!("{}/page/1/", server.uri())).unwrap();
    let page = PageRef::new("quotes", url, 1).unwrap();

    let started = Instant::now();
    let result = fetcher.fetch(&page, &config.fetch).await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, FetchStatus::Success);
    assert_eq!(result.attempts, 2);
    // The configured backoff tops out at 50ms; the server asked for 1s
    assert!(elapsed >= Duration::from_secs(1), "retried after {:?}", elapsed);
}
