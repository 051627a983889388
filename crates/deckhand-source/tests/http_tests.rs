//! HTTP layer sources against a mock catalog

use deckhand_core::{ConfigNode, LayerOrigin};
use deckhand_source::{HttpSource, LayerLoader, LayerSource, LoaderConfig, SourceError};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer, route: &str) -> HttpSource {
    let url = Url::parse(&format!("{}{}", server.uri(), route)).unwrap();
    HttpSource::new(url, LayerOrigin::Profile).unwrap().named("production")
}

fn quick() -> LoaderConfig {
    LoaderConfig {
        timeout: Duration::from_millis(200),
        retries: 2,
        backoff: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn test_fetch_yaml_layer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/web/production.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("replicaCount: 3\nimage:\n  tag: v2\n"))
        .expect(1)
        .mount(&server)
        .await;

    let layer = source(&server, "/web/production.yaml").fetch().await.unwrap();

    assert_eq!(layer.name(), "production");
    assert_eq!(layer.origin(), LayerOrigin::Profile);
    assert_eq!(layer.get("replicaCount").and_then(ConfigNode::as_i64), Some(3));
    assert_eq!(layer.get("image.tag").and_then(ConfigNode::as_str), Some("v2"));
}

#[tokio::test]
async fn test_fetch_json_layer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/web/release.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"service": {"port": 8080}}"#))
        .mount(&server)
        .await;

    let layer = source(&server, "/web/release.json").fetch().await.unwrap();
    assert_eq!(layer.get("service.port").and_then(ConfigNode::as_i64), Some(8080));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/web/missing.yaml"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let src = source(&server, "/web/missing.yaml");
    let err = LayerLoader::new(quick()).load(&src).await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound { .. }));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/web/production.yaml"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/web/production.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("replicaCount: 5\n"))
        .expect(1)
        .mount(&server)
        .await;

    let src = source(&server, "/web/production.yaml");
    let layer = LayerLoader::new(quick()).load(&src).await.unwrap();
    assert_eq!(layer.get("replicaCount").and_then(ConfigNode::as_i64), Some(5));
}

#[tokio::test]
async fn test_client_errors_fail_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let src = source(&server, "/web/production.yaml");
    let err = LayerLoader::new(quick()).load(&src).await.unwrap_err();
    assert!(matches!(err, SourceError::Http { status: 403, .. }));
}

#[tokio::test]
async fn test_slow_catalog_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("replicaCount: 2\n")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = LoaderConfig {
        timeout: Duration::from_millis(100),
        retries: 1,
        backoff: Duration::from_millis(5),
    };
    let src = source(&server, "/web/production.yaml");
    let err = LayerLoader::new(config).load(&src).await.unwrap_err();

    assert!(matches!(err, SourceError::Timeout { .. }));
    assert!(err.retryable());
}

#[tokio::test]
async fn test_invalid_document_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("- not\n- a mapping\n"))
        .expect(1)
        .mount(&server)
        .await;

    let src = source(&server, "/web/production.yaml");
    let err = LayerLoader::new(quick()).load(&src).await.unwrap_err();
    assert!(matches!(err, SourceError::Parse { .. }));
}
