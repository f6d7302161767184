//! End-to-end runs of the pipeline against mock lookup services.
//!
//! Each test gets its own scratch directory and MockServer. Both services are
//! pointed at the same server; they are told apart by path.

use blogroll::config::{Config, ServicesConfig};
use blogroll::pipeline::{run, RunSummary};
use pretty_assertions::assert_eq;
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INOREADER_PATH: &str = "/autocomplete.php";
const FEEDLY_PATH: &str = "/v3/search/feeds/";

fn test_config(dir: &Path, server: &MockServer, readme: &str) -> Config {
    let source = dir.join("README.md");
    std::fs::write(&source, readme).unwrap();
    Config {
        source,
        lookup_attempts: 1,
        retry_backoff_ms: 1,
        services: ServicesConfig {
            inoreader_base_url: server.uri(),
            feedly_base_url: server.uri(),
            ..ServicesConfig::default()
        },
        ..Config::default()
    }
    .with_output_dir(dir)
}

async fn inoreader_returns(server: &MockServer, site: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(INOREADER_PATH))
        .and(query_param("term", site))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_owned()))
        .mount(server)
        .await;
}

async fn feedly_returns(server: &MockServer, site: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(FEEDLY_PATH))
        .and(query_param("query", site))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_owned()))
        .mount(server)
        .await;
}

fn names(summary: &RunSummary) -> (Vec<&str>, Vec<&str>) {
    (
        summary.resolved.iter().map(|r| r.name.as_str()).collect(),
        summary.unresolved.iter().map(|r| r.name.as_str()).collect(),
    )
}

// ============================================================================
// Netflix resolves, Acme does not
// ============================================================================

const NETFLIX_ACME: &str = "# Engineering Blogs\n\
    \n\
    * Netflix https://netflixtechblog.com\n\
    * Acme https://doesnotexist.example\n";

async fn mount_netflix_acme(server: &MockServer) {
    inoreader_returns(
        server,
        "https://netflixtechblog.com",
        r#"[{"type": "feed", "value": "https://netflixtechblog.com/feed"}]"#,
    )
    .await;
    inoreader_returns(server, "https://doesnotexist.example", "[]").await;
    feedly_returns(server, "https://doesnotexist.example", r#"{"results": []}"#).await;
}

#[tokio::test]
async fn test_end_to_end_resolved_and_unresolved() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_netflix_acme(&server).await;
    let config = test_config(dir.path(), &server, NETFLIX_ACME);

    let summary = run(&config).await.unwrap();

    assert_eq!(summary.resolved.len(), 1);
    assert_eq!(summary.resolved[0].name, "Netflix");
    assert_eq!(
        summary.resolved[0].rss_url.as_deref(),
        Some("https://netflixtechblog.com/feed")
    );
    assert_eq!(summary.unresolved.len(), 1);
    assert_eq!(summary.unresolved[0].name, "Acme");
    assert_eq!(summary.unresolved[0].rss_url, None);
    assert_eq!(summary.cache_hits, 0);
    assert_eq!(summary.looked_up, 2);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config.json_path).unwrap()).unwrap();
    let items = json.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Netflix");
    assert_eq!(items[0]["site_url"], "https://netflixtechblog.com");
    assert_eq!(items[0]["rss_url"], "https://netflixtechblog.com/feed");
    assert!(items[0]["desc"].is_null());
    assert!(items[0]["tags"].is_null());

    let opml = std::fs::read_to_string(&config.opml_path).unwrap();
    assert_eq!(opml.matches(r#"type="rss""#).count(), 1);
    assert!(opml.contains(r#"xmlUrl="https://netflixtechblog.com/feed""#));
    assert!(opml.contains(r#"htmlUrl="https://netflixtechblog.com""#));
    assert!(!opml.contains("doesnotexist.example"));
}

#[tokio::test]
async fn test_second_run_uses_cache_and_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    // Netflix may be looked up exactly once across both runs
    Mock::given(method("GET"))
        .and(path(INOREADER_PATH))
        .and(query_param("term", "https://netflixtechblog.com"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"type": "feed", "value": "https://netflixtechblog.com/feed"}]"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    inoreader_returns(&server, "https://doesnotexist.example", "[]").await;
    feedly_returns(&server, "https://doesnotexist.example", r#"{"results": []}"#).await;

    let config = test_config(dir.path(), &server, NETFLIX_ACME);

    let first = run(&config).await.unwrap();
    let first_opml = std::fs::read(&config.opml_path).unwrap();
    let first_json = std::fs::read(&config.json_path).unwrap();

    let second = run(&config).await.unwrap();
    let second_opml = std::fs::read(&config.opml_path).unwrap();
    let second_json = std::fs::read(&config.json_path).unwrap();

    assert_eq!(first.resolved, second.resolved);
    assert_eq!(second.cache_hits, 1);
    // Only the unresolved entry is looked up again
    assert_eq!(second.looked_up, 1);
    assert_eq!(first_opml, second_opml);
    assert_eq!(first_json, second_json);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn test_broken_service_response_does_not_abort_batch() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    inoreader_returns(
        &server,
        "https://a.example",
        r#"[{"type": "feed", "value": "https://a.example/feed"}]"#,
    )
    .await;
    // Both services misbehave for b.example
    Mock::given(method("GET"))
        .and(path(INOREADER_PATH))
        .and(query_param("term", "https://b.example"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    feedly_returns(&server, "https://b.example", "<html>not json</html>").await;
    // c.example only known to the secondary service
    inoreader_returns(&server, "https://c.example", r#"{"unexpected": "shape"}"#).await;
    feedly_returns(
        &server,
        "https://c.example",
        r#"{"results": [{"feedId": "feed/https://c.example/atom.xml"}]}"#,
    )
    .await;

    let readme = "* Alpha https://a.example\n* Bravo https://b.example\n* Charlie https://c.example\n";
    let config = test_config(dir.path(), &server, readme);

    let summary = run(&config).await.unwrap();
    let (resolved, unresolved) = names(&summary);
    assert_eq!(resolved, vec!["Alpha", "Charlie"]);
    assert_eq!(unresolved, vec!["Bravo"]);
    assert_eq!(
        summary.resolved[1].rss_url.as_deref(),
        Some("https://c.example/atom.xml")
    );
}

// ============================================================================
// Sorting, dedup, exclusion
// ============================================================================

#[tokio::test]
async fn test_output_sorted_by_capitalized_name() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    let sites = [
        ("mit", "https://mit.example"),
        ("Zalando", "https://zalando.example"),
        ("aWS", "https://aws.example"),
    ];
    let mut readme = String::new();
    for (name, site) in sites {
        readme.push_str(&format!("* {name} {site}\n"));
        inoreader_returns(
            &server,
            site,
            &format!(r#"[{{"type": "feed", "value": "{site}/feed"}}]"#),
        )
        .await;
    }

    let config = test_config(dir.path(), &server, &readme);
    let summary = run(&config).await.unwrap();
    assert_eq!(names(&summary).0, vec!["aWS", "mit", "Zalando"]);

    let opml = std::fs::read_to_string(&config.opml_path).unwrap();
    let aws = opml.find(r#"text="aWS""#).unwrap();
    let mit = opml.find(r#"text="mit""#).unwrap();
    let zalando = opml.find(r#"text="Zalando""#).unwrap();
    assert!(aws < mit && mit < zalando);
}

#[tokio::test]
async fn test_duplicates_and_excluded_never_looked_up() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(INOREADER_PATH))
        .and(query_param("term", "https://a.example"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"[{"type": "feed", "value": "https://a.example/feed"}]"#),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("term", "https://skip.example"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("query", "https://skip.example"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"results": []}"#))
        .expect(0)
        .mount(&server)
        .await;

    let readme = "* Alpha https://a.example\n\
        * Alpha (mirror) https://a.example\n\
        * Skipped https://skip.example\n";
    let mut config = test_config(dir.path(), &server, readme);
    config.exclude = vec!["https://skip.example".to_string()];

    let summary = run(&config).await.unwrap();
    assert_eq!(names(&summary), (vec!["Alpha"], vec![]));
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.excluded, 1);
}

#[tokio::test]
async fn test_many_entries_resolved_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    let mut readme = String::new();
    for i in (0..12).rev() {
        let site = format!("https://blog{i:02}.example");
        readme.push_str(&format!("* Blog {i:02} {site}\n"));
        inoreader_returns(
            &server,
            &site,
            &format!(r#"[{{"type": "feed", "value": "{site}/rss"}}]"#),
        )
        .await;
    }

    let mut config = test_config(dir.path(), &server, &readme);
    config.concurrency = 6;

    let summary = run(&config).await.unwrap();
    let expected: Vec<String> = (0..12).map(|i| format!("Blog {i:02}")).collect();
    let got: Vec<String> = summary.resolved.iter().map(|r| r.name.clone()).collect();
    assert_eq!(got, expected);
    assert!(summary.unresolved.is_empty());
}

#[tokio::test]
async fn test_cache_only_run_counts_no_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = test_config(dir.path(), &server, NETFLIX_ACME);
    config.services.order = Vec::new();

    let summary = run(&config).await.unwrap();
    assert_eq!(summary.looked_up, 0);
    assert_eq!(summary.cache_hits, 0);
    assert_eq!(summary.unresolved.len(), 2);
}

#[tokio::test]
async fn test_malformed_cache_file_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_netflix_acme(&server).await;
    let config = test_config(dir.path(), &server, NETFLIX_ACME);
    std::fs::write(&config.opml_path, "<opml><body><outline").unwrap();

    let summary = run(&config).await.unwrap();
    assert_eq!(summary.cache_hits, 0);
    assert_eq!(summary.resolved.len(), 1);

    // The broken file was replaced with a valid one
    let opml = std::fs::read_to_string(&config.opml_path).unwrap();
    assert!(opml.contains(r#"xmlUrl="https://netflixtechblog.com/feed""#));
}
