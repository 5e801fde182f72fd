//! HTTP client tests against a mock server: reauthorization, batching and
//! paging over the real wire format.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedsync::engine::{fetch_stream_ids, CancelFlag, StreamFilter};
use feedsync::remote::{
    ApiClient, Authorizer, Credentials, MarkAction, RemoteSyncClient, ResourceId, TransportError,
};

/// Hands out a fixed token and counts how often it was asked.
struct CountingAuthorizer {
    token: &'static str,
    calls: AtomicUsize,
}

impl CountingAuthorizer {
    fn new(token: &'static str) -> Arc<Self> {
        Arc::new(Self {
            token,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authorizer for CountingAuthorizer {
    async fn reauthorize(&self, current: &Credentials) -> Result<Credentials, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Credentials::new(current.user_id.clone(), self.token))
    }
}

fn client(server: &MockServer) -> ApiClient {
    let base = Url::parse(&format!("{}/", server.uri())).unwrap();
    ApiClient::new(base, Duration::from_secs(5))
        .unwrap()
        .with_credentials(Credentials::new("u1", "token-1"))
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

// ============================================================================
// Reauthorization
// ============================================================================

#[tokio::test]
async fn test_401_reauthorizes_and_retries_with_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .and(header("authorization", "OAuth token-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .and(header("authorization", "OAuth token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "user/u1/category/tech", "label": "Tech", "feeds": []}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let authorizer = CountingAuthorizer::new("token-2");
    let client = client(&server).with_authorizer(authorizer.clone());

    let collections = client.get_collections().await.unwrap();

    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].label, "Tech");
    assert_eq!(authorizer.calls(), 1);
    assert_eq!(client.credentials().unwrap().access_token.expose_secret(), "token-2");
}

#[tokio::test]
async fn test_second_401_is_returned_without_another_reauth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let authorizer = CountingAuthorizer::new("token-2");
    let client = client(&server).with_authorizer(authorizer.clone());

    let result = client.get_collections().await;

    assert!(matches!(result, Err(TransportError::Unauthorized)));
    assert_eq!(authorizer.calls(), 1);
}

#[tokio::test]
async fn test_unchanged_token_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let authorizer = CountingAuthorizer::new("token-1");
    let client = client(&server).with_authorizer(authorizer.clone());

    assert!(matches!(
        client.get_collections().await,
        Err(TransportError::Unauthorized)
    ));
    assert_eq!(authorizer.calls(), 1);
}

#[tokio::test]
async fn test_401_without_authorizer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    assert!(matches!(
        client(&server).get_collections().await,
        Err(TransportError::Unauthorized)
    ));
}

// ============================================================================
// Status Mapping
// ============================================================================

#[tokio::test]
async fn test_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v3/collections/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(matches!(
        client.get_collections().await,
        Err(TransportError::HttpStatus(503))
    ));
    assert!(matches!(
        client.delete_collection("missing").await,
        Err(TransportError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = client(&server).get_collections().await;
    assert!(matches!(result, Err(TransportError::Decode(_))));
}

// ============================================================================
// Paging and Batching
// ============================================================================

#[tokio::test]
async fn test_stream_ids_follow_continuation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/streams/ids"))
        .and(query_param("streamId", "user/u1/category/global.all"))
        .and(query_param("unreadOnly", "true"))
        .and(query_param("continuation", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": ["c"]})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/streams/ids"))
        .and(query_param("streamId", "user/u1/category/global.all"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ids": ["a", "b"], "continuation": "page-2"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let filter = StreamFilter {
        newer_than: None,
        unread_only: Some(true),
    };
    let ids = fetch_stream_ids(&client, &ResourceId::all("u1"), filter, &CancelFlag::new())
        .await
        .unwrap();

    let expected: std::collections::HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_mark_articles_splits_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/markers"))
        .and(body_partial_json(json!({"action": "markAsRead", "type": "entries"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let ids: Vec<String> = (0..301).map(|i| format!("id{i}")).collect();
    client(&server).mark_articles(&ids, MarkAction::Read).await.unwrap();

    let sizes: Vec<usize> = request_bodies(&server)
        .await
        .iter()
        .map(|body| body["entryIds"].as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![300, 1]);
}

#[tokio::test]
async fn test_mark_articles_fails_if_any_batch_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/markers"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/markers"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let ids: Vec<String> = (0..4).map(|i| format!("id{i}")).collect();
    let client = client(&server).with_batch_sizes(2, 1000);

    let result = client.mark_articles(&ids, MarkAction::Saved).await;
    assert!(matches!(result, Err(TransportError::HttpStatus(500))));
}

#[tokio::test]
async fn test_get_entries_in_batches() {
    let server = MockServer::start().await;
    let entry = |id: &str| {
        json!({
            "id": id,
            "crawled": 1_700_000_000_000i64,
            "origin": {"streamId": "feed/https://example.com/rss"}
        })
    };
    Mock::given(method("POST"))
        .and(path("/v3/entries/.mget"))
        .and(body_json(json!(["e1", "e2"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([entry("e1"), entry("e2")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/entries/.mget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([entry("e3")])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).with_batch_sizes(300, 2);
    let ids: Vec<String> = ["e1", "e2", "e3"].iter().map(|s| s.to_string()).collect();

    let entries = client.get_entries(&ids).await.unwrap();

    let got: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(got, vec!["e1", "e2", "e3"]);
    assert_eq!(entries[0].feed_id(), Some("feed/https://example.com/rss"));
}

// ============================================================================
// Suspension
// ============================================================================

#[tokio::test]
async fn test_suspend_abandons_in_flight_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = Arc::new(client(&server));
    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.get_collections().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.suspend();

    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("suspend should abandon the request")
        .unwrap();
    assert!(matches!(result, Err(TransportError::Suspended)));

    client.resume();
    assert!(!client.is_suspended());
}
