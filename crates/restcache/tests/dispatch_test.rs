//! Integration tests for the request dispatch pipeline.
//!
//! Each test runs against a wiremock server and uses its own resource and
//! transport caches so tests never observe each other's entries.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use pretty_assertions::assert_eq;
use restcache::{
    ClientConfig, ContentType, RequestBuilder, ResourceCache, RestError, TransportCache,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, header_exists, method, path},
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig {
        base_url: server.uri(),
        timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    }
}

fn isolated(config: ClientConfig) -> RequestBuilder {
    init_tracing();
    RequestBuilder::with_caches(
        config,
        Arc::new(ResourceCache::new()),
        Arc::new(TransportCache::new()),
    )
    .expect("valid config")
}

#[derive(Serialize)]
struct Item {
    id: u32,
    name: String,
}

#[tokio::test]
async fn test_fresh_response_served_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", "public, max-age=60")
                .set_body_string("[1,2,3]"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let first = client.get("/v1/items").await.expect("first request");
    let second = client.get("/v1/items").await.expect("second request");

    assert_eq!(first.status(), 200);
    assert_eq!(second.body().as_ref(), b"[1,2,3]");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.ttl().is_some());
    assert!(!first.revalidate());

    let stats = client.cache().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.stores, 1);
}

#[tokio::test]
async fn test_expired_response_goes_back_to_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/short"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", "max-age=1")
                .set_body_string("short-lived"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let first = client.get("/short").await.expect("first request");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let second = client.get("/short").await.expect("second request");

    assert!(!Arc::ptr_eq(&first, &second));
    // The refreshed response replaces the expired entry.
    let url = format!("{}/short", server.uri());
    assert!(Arc::ptr_eq(&client.cache().get(&url).expect("cached"), &second));
}

#[tokio::test]
async fn test_etag_revalidation_returns_cached_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/etag"))
        .and(header("If-None-Match", "\"abc\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/etag"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"abc\"")
                .set_body_string("tagged body"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let first = client.get("/etag").await.expect("first request");
    assert!(first.revalidate());
    assert_eq!(first.etag(), Some("\"abc\""));

    let second = client.get("/etag").await.expect("revalidated request");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.status(), 200);
    assert_eq!(second.text(), "tagged body");
    assert_eq!(client.cache().stats().stale_hits, 1);
}

#[tokio::test]
async fn test_last_modified_sends_if_modified_since() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dated"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", "Fri, 01 Mar 2024 00:00:00 GMT")
                .set_body_string("dated body"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    client.get("/dated").await.expect("first request");
    client.get("/dated").await.expect("second request");

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2);
    assert!(requests[0].headers.get("if-modified-since").is_none());
    assert_eq!(
        requests[1].headers.get("if-modified-since").unwrap(),
        "Fri, 01 Mar 2024 00:00:00 GMT"
    );
    assert!(requests[1].headers.get("if-none-match").is_none());
}

#[tokio::test]
async fn test_changed_resource_replaces_stale_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .and(header("If-None-Match", "\"v1\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v2\"")
                .set_body_string("second version"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_string("first version"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    client.get("/doc").await.expect("first request");
    let updated = client.get("/doc").await.expect("second request");

    assert_eq!(updated.text(), "second version");
    let url = format!("{}/doc", server.uri());
    let stored = client.cache().get(&url).expect("cached");
    assert!(Arc::ptr_eq(&stored, &updated));
    assert_eq!(stored.etag(), Some("\"v2\""));
}

#[tokio::test]
async fn test_response_without_cache_signal_is_not_stored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain"))
        .expect(2)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    client.get("/plain").await.expect("first request");
    client.get("/plain").await.expect("second request");

    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_non_success_status_is_returned_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let response = client.get("/missing").await.expect("status is not an error");
    assert_eq!(response.status(), 404);
    assert_eq!(response.text(), "not here");
}

#[tokio::test]
async fn test_unexpected_not_modified_without_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/odd"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let response = client.get("/odd").await.expect("request completes");
    assert_eq!(response.status(), 304);
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_post_is_never_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/items"))
        .and(header("Content-Type", "application/json"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Cache-Control", "max-age=60")
                .set_body_string("created"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let item = Item {
        id: 7,
        name: "widget".to_string(),
    };
    client.post("/v1/items", &item).await.expect("first post");
    let second = client.post("/v1/items", &item).await.expect("second post");

    assert_eq!(second.status(), 201);
    assert!(client.cache().is_empty());

    let requests = server.received_requests().await.expect("recording enabled");
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("JSON body");
    assert_eq!(sent, serde_json::json!({"id": 7, "name": "widget"}));
}

#[tokio::test]
async fn test_xml_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/items/7"))
        .and(header("Content-Type", "application/xml"))
        .and(header("Accept", "application/xml"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated(ClientConfig {
        content_type: ContentType::Xml,
        ..config_for(&server)
    });
    let item = Item {
        id: 7,
        name: "widget".to_string(),
    };
    client.put("/v1/items/7", &item).await.expect("put");

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(
        String::from_utf8_lossy(&requests[0].body),
        "<Item><id>7</id><name>widget</name></Item>"
    );
}

#[tokio::test]
async fn test_encode_failure_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let mut body = BTreeMap::new();
    body.insert(vec![1_u8, 2], 3_u32);

    let err = client
        .post("/v1/items", &body)
        .await
        .expect_err("map keys must be strings");
    assert!(matches!(err, RestError::Json(_)));
    assert!(err.is_local());
}

#[tokio::test]
async fn test_disable_cache_bypasses_lookup_and_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", "max-age=60")
                .insert_header("ETag", "\"abc\""),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = isolated(ClientConfig {
        disable_cache: true,
        ..config_for(&server)
    });
    client.get("/v1/items").await.expect("first request");
    client.get("/v1/items").await.expect("second request");

    assert!(client.cache().is_empty());
    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests[1].headers.get("if-none-match").is_none());
}

#[tokio::test]
async fn test_head_and_options_are_cached() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/meta"))
        .respond_with(ResponseTemplate::new(200).insert_header("Cache-Control", "max-age=60"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("OPTIONS"))
        .and(path("/capabilities"))
        .respond_with(ResponseTemplate::new(204).insert_header("Cache-Control", "max-age=60"))
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let head = client.head("/meta").await.expect("head");
    let head_again = client.head("/meta").await.expect("head again");
    assert!(Arc::ptr_eq(&head, &head_again));

    let options = client.options("/capabilities").await.expect("options");
    let options_again = client.options("/capabilities").await.expect("options again");
    assert!(Arc::ptr_eq(&options, &options_again));
    assert_eq!(client.cache().len(), 2);
}

#[tokio::test]
async fn test_delete_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/items/7"))
        .respond_with(ResponseTemplate::new(204).insert_header("Cache-Control", "max-age=60"))
        .expect(2)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    client.delete("/v1/items/7").await.expect("first delete");
    client.delete("/v1/items/7").await.expect("second delete");
    assert!(client.cache().is_empty());

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests[0].headers.get("content-type").is_none());
}

#[tokio::test]
async fn test_default_headers_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hdr"))
        .and(header("Cache-Control", "no-cache"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    client.get("/hdr").await.expect("request");

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests[0].headers.get("content-type").is_none());
    assert!(requests[0].headers.get("x-original-url").is_none());
}

#[tokio::test]
async fn test_custom_headers_replace_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hdr"))
        .and(header("X-Api-Key", "secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server))
        .with_header("X-Api-Key", "secret")
        .expect("valid header");
    client.get("/hdr").await.expect("request");

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests[0].headers.get("cache-control").is_none());
    assert_eq!(requests[0].headers.get("accept").unwrap(), "application/json");
}

#[tokio::test]
async fn test_mockup_redirect_keeps_original_cache_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .and(header("X-Original-URL", "https://api.example.com/v1/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", "max-age=60")
                .set_body_string("mocked"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated(ClientConfig {
        base_url: "https://api.example.com".to_string(),
        mockup_url: Some(server.uri()),
        ..Default::default()
    });
    let first = client.get("/v1/items").await.expect("mocked request");
    let second = client.get("/v1/items").await.expect("cached request");

    assert_eq!(first.text(), "mocked");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(
        client
            .cache()
            .get("https://api.example.com/v1/items")
            .is_some()
    );
    assert!(
        client
            .cache()
            .get(&format!("{}/v1/items", server.uri()))
            .is_none()
    );
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client = isolated(ClientConfig {
        timeout: Some(Duration::from_millis(100)),
        ..config_for(&server)
    });
    let err = client.get("/slow").await.expect_err("request should time out");
    assert!(err.is_timeout());
    assert!(!err.is_local());
}

#[tokio::test]
async fn test_invalid_url_is_reported() {
    let client = isolated(ClientConfig::default());
    let err = client
        .get("not a url")
        .await
        .expect_err("relative URL without base");
    assert!(matches!(err, RestError::InvalidUrl { .. }));
}

#[tokio::test]
async fn test_connection_failure_is_reported() {
    let client = isolated(ClientConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        ..Default::default()
    });
    let err = client.get("/unreachable").await.expect_err("nothing listens");
    assert!(matches!(err, RestError::Http(_)));
    assert!(!err.is_local());
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_process_wide_cache_is_shared_between_builders() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shared"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", "max-age=60")
                .set_body_string("shared"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let first_builder = RequestBuilder::new(config_for(&server)).expect("valid config");
    let second_builder = RequestBuilder::new(config_for(&server)).expect("valid config");

    let first = first_builder.get("/shared").await.expect("network request");
    let second = second_builder.get("/shared").await.expect("cached request");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(first_builder.cache(), &ResourceCache::global()));
}

#[tokio::test]
async fn test_conditional_header_requires_stale_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/both"))
        .and(header_exists("If-None-Match"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/both"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", "max-age=60")
                .insert_header("ETag", "\"abc\""),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let first = client.get("/both").await.expect("first request");
    let second = client.get("/both").await.expect("fresh hit");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(!first.revalidate());
}

#[tokio::test]
async fn test_expired_entry_with_etag_is_revalidated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/expiring"))
        .and(header("If-None-Match", "\"t\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/expiring"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", "max-age=1")
                .insert_header("ETag", "\"t\"")
                .set_body_string("expiring body"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let first = client.get("/expiring").await.expect("first request");
    assert!(!first.revalidate());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let second = client.get("/expiring").await.expect("revalidated request");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.status(), 200);
    assert_eq!(second.text(), "expiring body");
    assert_eq!(client.cache().stats().stale_hits, 1);
}

#[tokio::test]
async fn test_single_conditional_header_when_both_validators_known() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/validated"))
        .and(header("If-None-Match", "\"abc\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/validated"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"abc\"")
                .insert_header("Last-Modified", "Fri, 01 Mar 2024 00:00:00 GMT")
                .set_body_string("validated body"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let client = isolated(config_for(&server));
    let first = client.get("/validated").await.expect("first request");
    let second = client.get("/validated").await.expect("revalidated request");
    assert!(Arc::ptr_eq(&first, &second));

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2);
    assert!(requests[0].headers.get("if-none-match").is_none());
    assert!(requests[0].headers.get("if-modified-since").is_none());
    assert_eq!(requests[1].headers.get("if-none-match").unwrap(), "\"abc\"");
    assert!(requests[1].headers.get("if-modified-since").is_none());
}
