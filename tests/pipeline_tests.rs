//! End-to-end pipeline tests against a wiremock site
//!
//! The external transform and proxy are replaced by small `sh` scripts so
//! the orchestration can run without mitmproxy installed.

use std::path::Path;
use surface_scout::browser::BrowserError;
use surface_scout::config::{BrowserEngine, Config};
use surface_scout::pipeline::Pipeline;
use surface_scout::proxy::ProxyError;
use surface_scout::{CrawlState, ScoutError, TrafficEntry, TrafficLog};
use tempfile::{tempdir, TempDir};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Stand-in transform: lists an ignored template first, then emits the
/// endpoint once the template has been approved.
const TRANSFORM_SCRIPT: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    -p) prefix="$2"; shift ;;
  esac
  shift
done
if [ -f "$out" ] && ! grep -q 'ignore:' "$out"; then
  printf 'openapi: 3.0.0\nservers:\n- url: %s\npaths:\n  /users/{id}:\n    get:\n      summary: user\nx-path-templates:\n- /users/{id}\n' "$prefix" > "$out"
else
  printf 'openapi: 3.0.0\nservers:\n- url: %s\npaths: {}\nx-path-templates:\n- ignore:/users/{id}\n' "$prefix" > "$out"
fi
"#;

async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><body>
                <a href="/api/v1/users">Users</a>
                <a href="/api/v1/items">Items</a>
                <a href="/api/v1/orders">Orders</a>
                <a href="/api/v1/stats">Stats</a>
                <a href="/logo.png">Logo</a>
            </body></html>"#,
            "text/html",
        ))
        .mount(server)
        .await;
    for endpoint in ["users", "items", "orders", "stats"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/{}", endpoint)))
            .respond_with(ResponseTemplate::new(200).set_body_raw("[]", "application/json"))
            .mount(server)
            .await;
    }
}

fn out(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.browser.engine = BrowserEngine::Http;
    config.crawler.max_depth = 1;
    config.crawler.politeness_delay_ms = 0;
    config.crawler.submit_settle_ms = 0;
    config.prober.samples = 2;
    config.prober.min_delay_ms = 0;
    config.prober.max_delay_ms = 0;
    config.proxy.startup_timeout_ms = 2_000;
    config.proxy.shutdown_grace_ms = 1_000;
    config.output.traffic_path = out(dir, "traffic.har");
    config.output.checkpoint_path = out(dir, "state.db");
    config.output.initial_spec_path = out(dir, "initial.yaml");
    config.output.proxy_dump_path = out(dir, "dump.flow");
    config.output.final_spec_path = out(dir, "final.yaml");
    config
}

fn shell(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string(), "tool".to_string()]
}

#[tokio::test]
async fn test_missing_transform_stops_after_inference() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = tempdir().unwrap();

    let mut config = test_config(&dir);
    config.synth.program = "surface-scout-missing-transform".to_string();

    let report = Pipeline::new(config, format!("{}/", server.uri()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.crawl.state, CrawlState::Completed);
    assert_eq!(report.crawl.visited.len(), 5);
    assert_eq!(report.traffic_entries, 5);
    assert_eq!(
        report.prefix.map(|p| p.to_string()),
        Some(format!("{}/api/v1", server.uri()))
    );
    assert!(report.synth_error.is_some());
    assert!(report.initial_spec.is_none());
    assert!(report.probe.is_none());

    let log = TrafficLog::load(Path::new(&out(&dir, "traffic.har"))).unwrap();
    assert_eq!(log.len(), 5);
    assert!(!dir.path().join("state.db").exists());
}

#[tokio::test]
async fn test_prefix_falls_back_to_origin_without_api_traffic() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();

    let mut config = test_config(&dir);
    config.synth.program = "surface-scout-missing-transform".to_string();

    let report = Pipeline::new(config, server.uri()).run().await.unwrap();

    assert!(report.prefix.is_none());
    assert_eq!(report.api_base, Some(server.uri()));
}

#[tokio::test]
async fn test_required_chromium_that_cannot_launch_is_fatal() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = tempdir().unwrap();

    let mut config = test_config(&dir);
    config.browser.engine = BrowserEngine::Chromium;
    config.browser.executable = Some(out(&dir, "no-such-chromium"));

    let err = Pipeline::new(config, server.uri()).run().await.unwrap_err();

    assert!(matches!(err, ScoutError::Browser(BrowserError::Launch(_))));
    assert!(!dir.path().join("traffic.har").exists());
}

#[tokio::test]
async fn test_auto_engine_falls_back_to_http() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = tempdir().unwrap();

    let mut config = test_config(&dir);
    config.browser.engine = BrowserEngine::Auto;
    config.browser.executable = Some(out(&dir, "no-such-chromium"));
    config.synth.program = "surface-scout-missing-transform".to_string();

    let report = Pipeline::new(config, format!("{}/", server.uri()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.crawl.visited.len(), 5);
    assert_eq!(report.traffic_entries, 5);
}

#[tokio::test]
async fn test_resumed_crawl_appends_to_capture() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = tempdir().unwrap();

    let earlier: TrafficLog = vec![TrafficEntry::new(
        "https://old.test/api/v1/legacy",
        "GET",
        "application/json",
        200,
    )]
    .into_iter()
    .collect();
    earlier.save(Path::new(&out(&dir, "traffic.har"))).unwrap();

    let report = Pipeline::new(test_config(&dir), format!("{}/", server.uri()))
        .resume(true)
        .crawl_until(std::future::pending::<()>())
        .await
        .unwrap();
    assert_eq!(report.visited.len(), 5);

    let log = TrafficLog::load(Path::new(&out(&dir, "traffic.har"))).unwrap();
    assert_eq!(log.len(), 6);
    assert_eq!(log.entries()[0].url, "https://old.test/api/v1/legacy");
}

#[cfg(unix)]
#[tokio::test]
async fn test_proxy_start_failure_is_fatal() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let dir = tempdir().unwrap();

    let mut config = test_config(&dir);
    config.synth.program = "sh".to_string();
    config.synth.args = shell(TRANSFORM_SCRIPT);
    config.proxy.program = "sh".to_string();
    config.proxy.args = shell("echo 'cannot bind' >&2; exit 1");

    let err = Pipeline::new(config, server.uri()).run().await.unwrap_err();

    assert!(matches!(
        err,
        ScoutError::Proxy(ProxyError::ExitedEarly { .. })
    ));
    assert!(dir.path().join("initial.yaml").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_full_run_probes_through_proxy() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .expect(2)
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();

    // The mock server doubles as the proxy; the supervised process only
    // has to stay alive until it is stopped.
    let mut config = test_config(&dir);
    config.synth.program = "sh".to_string();
    config.synth.args = shell(TRANSFORM_SCRIPT);
    config.proxy.program = "sh".to_string();
    config.proxy.args = shell("sleep 30");
    config.proxy.port = server.address().port();

    let report = Pipeline::new(config, server.uri())
        .with_headers(vec![("X-Scan".to_string(), "1".to_string())])
        .run()
        .await
        .unwrap();

    let probe = report.probe.unwrap();
    assert_eq!(probe.endpoints, 1);
    assert_eq!(probe.attempted, 2);
    assert_eq!(probe.succeeded, 2);
    assert!(report.synth_error.is_none());
    assert!(!report.interrupted);

    let final_spec = report.final_spec.unwrap();
    let content = std::fs::read_to_string(final_spec).unwrap();
    assert!(content.contains(&format!("{}/api/v1", server.uri())));
    assert!(content.contains("/users/{id}"));
}
