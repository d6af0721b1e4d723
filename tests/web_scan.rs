use confused::registry::{RecordingSleeper, RegistryEndpoints, RetryPolicy};
use confused::{
    ConfusedError, Ecosystem, HttpConfig, RegistryClient, SafeSpaces, ScanKind, Scanner,
    WebOptions, WebScanner,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn web_scanner(registry: &MockServer) -> WebScanner {
    let client = RegistryClient::new(&HttpConfig::default())
        .unwrap()
        .with_endpoints(RegistryEndpoints::all(&registry.uri()))
        .with_retry(
            RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_secs(10),
            },
            Arc::new(RecordingSleeper::new()),
        );
    let scanner = Scanner::new(Arc::new(client), SafeSpaces::default(), 4);
    WebScanner::new(scanner, &HttpConfig::default()).unwrap()
}

/// `host:port` of a mock server, as used in web result targets.
fn authority(server: &MockServer) -> String {
    server.address().to_string()
}

#[tokio::test]
async fn exposed_manifest_is_scanned() {
    let site = MockServer::start().await;
    let registry = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/package.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"dependencies":{"react":"^18.2.0","acme-design-system":"^3.1.0"}}"#),
        )
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/requirements.txt"))
        .respond_with(ResponseTemplate::new(500).set_body_string("flask==2.0\n"))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/react"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"react"}"#))
        .mount(&registry)
        .await;

    let options = WebOptions {
        ecosystems: vec![Ecosystem::Npm, Ecosystem::Pip],
        ..Default::default()
    };
    let results = web_scanner(&registry)
        .scan_targets(vec![site.uri()], &options)
        .await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.target(), format!("{}:package.json", authority(&site)));
    assert_eq!(result.kind(), ScanKind::Web);
    assert_eq!(result.vulnerable(), ["acme-design-system".to_string()]);
    assert_eq!(result.safe(), ["react".to_string()]);
    assert_eq!(result.metadata()["status_code"], 200);
    assert_eq!(result.metadata()["file_path"], "package.json");
    assert_eq!(
        result.metadata()["file_url"],
        format!("{}/package.json", site.uri()).as_str()
    );
}

#[tokio::test]
async fn deep_mode_probes_common_directories() {
    let site = MockServer::start().await;
    let registry = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/backend/composer.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"require":{"acme/billing":"^1.0"}}"#),
        )
        .expect(1)
        .mount(&site)
        .await;

    let shallow = WebOptions {
        ecosystems: vec![Ecosystem::Composer],
        ..Default::default()
    };
    let scanner = web_scanner(&registry);
    assert!(scanner.scan_targets(vec![site.uri()], &shallow).await.is_empty());

    let deep = WebOptions {
        deep: true,
        ..shallow
    };
    let results = scanner.scan_targets(vec![site.uri()], &deep).await;
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].target(),
        format!("{}:backend/composer.json", authority(&site))
    );
    assert_eq!(results[0].vulnerable(), ["acme/billing".to_string()]);
}

#[tokio::test]
async fn wordlist_paths_are_probed() {
    let site = MockServer::start().await;
    let registry = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/build/pom.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<project><dependencies><dependency><groupId>com.acme</groupId><artifactId>core</artifactId></dependency></dependencies></project>"#,
        ))
        .mount(&site)
        .await;

    let options = WebOptions {
        ecosystems: vec![Ecosystem::Maven],
        wordlist: vec!["/build/pom.xml".to_string()],
        ..Default::default()
    };
    let results = web_scanner(&registry)
        .scan_targets(vec![site.uri()], &options)
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].vulnerable(), ["com.acme:core".to_string()]);
}

#[tokio::test]
async fn every_target_is_scanned() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    let registry = MockServer::start().await;

    for site in [&first, &second] {
        Mock::given(method("GET"))
            .and(path("/Gemfile"))
            .respond_with(ResponseTemplate::new(200).set_body_string("gem 'acme-sso'\n"))
            .mount(site)
            .await;
    }

    let options = WebOptions {
        ecosystems: vec![Ecosystem::Rubygems],
        ..Default::default()
    };
    let mut results = web_scanner(&registry)
        .scan_targets(vec![first.uri(), second.uri(), "http://127.0.0.1:1".to_string()], &options)
        .await;
    results.sort_by(|a, b| a.target().cmp(b.target()));

    let mut expected = vec![
        format!("{}:Gemfile", authority(&first)),
        format!("{}:Gemfile", authority(&second)),
    ];
    expected.sort();
    let targets: Vec<String> = results.iter().map(|r| r.target().to_string()).collect();
    assert_eq!(targets, expected);
}

#[tokio::test]
async fn dead_host_is_abandoned_after_first_failure() {
    // Accepts connections and drops them before answering.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    let registry = MockServer::start().await;
    let options = WebOptions {
        deep: true,
        ..Default::default()
    };
    let outcome = web_scanner(&registry)
        .scan_target(&format!("http://{}", address), &options)
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(outcome, Err(ConfusedError::TargetUnreachable { .. })));
    assert_eq!(connections.load(Ordering::SeqCst), 1);
}
