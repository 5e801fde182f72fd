use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use super::auth::{Authorizer, Credentials};
use super::error::TransportError;
use super::models::{Collection, Entry, MarkAction, RemoteFeed, ResourceId, Stream, StreamIds};
use super::RemoteSyncClient;

/// Maximum ids per markers request.
pub const DEFAULT_MARK_BATCH_SIZE: usize = 300;
/// Maximum ids per entries request.
pub const DEFAULT_ENTRIES_BATCH_SIZE: usize = 1000;
/// Items requested per stream page.
const STREAM_PAGE_SIZE: &str = "1000";

/// HTTP implementation of [`RemoteSyncClient`].
///
/// A 401 response triggers at most one reauthorization through the
/// configured [`Authorizer`]; the request is replayed only if the access
/// token actually changed. While suspended, every call fails with
/// [`TransportError::Suspended`] and in-flight requests are abandoned.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: RwLock<Option<Arc<Credentials>>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    suspended: watch::Sender<bool>,
    mark_batch_size: usize,
    entries_batch_size: usize,
}

impl ApiClient {
    /// `base_url` should already be validated (see
    /// [`validate_api_base_url`](crate::util::validate_api_base_url)).
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("feedsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http_client(http, base_url))
    }

    pub fn with_http_client(http: reqwest::Client, base_url: Url) -> Self {
        let (suspended, _) = watch::channel(false);
        Self {
            http,
            base_url,
            credentials: RwLock::new(None),
            authorizer: None,
            suspended,
            mark_batch_size: DEFAULT_MARK_BATCH_SIZE,
            entries_batch_size: DEFAULT_ENTRIES_BATCH_SIZE,
        }
    }

    pub fn with_credentials(self, credentials: Credentials) -> Self {
        self.set_credentials(credentials);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_batch_sizes(mut self, mark: usize, entries: usize) -> Self {
        self.mark_batch_size = mark.max(1);
        self.entries_batch_size = entries.max(1);
        self
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        let credentials = Some(Arc::new(credentials));
        match self.credentials.write() {
            Ok(mut guard) => *guard = credentials,
            Err(poisoned) => *poisoned.into_inner() = credentials,
        }
    }

    pub fn credentials(&self) -> Option<Arc<Credentials>> {
        match self.credentials.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_suspended(&self) -> bool {
        *self.suspended.borrow()
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Decode(format!("invalid request path {path}: {e}")))
    }

    /// `v3/collections/<id>[/<suffix>...]` with the id percent-encoded as one segment.
    fn collection_url(&self, collection_id: &str, suffix: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.url("v3/collections")?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| TransportError::Decode("base URL cannot have path segments".into()))?;
            segments.pop_if_empty().push(collection_id);
            segments.extend(suffix);
        }
        Ok(url)
    }

    fn stream_url(
        &self,
        path: &str,
        resource: &ResourceId,
        continuation: Option<&str>,
        newer_than: Option<DateTime<Utc>>,
        unread_only: Option<bool>,
    ) -> Result<Url, TransportError> {
        let mut url = self.url(path)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(date) = newer_than {
                query.append_pair("newerThan", &date.timestamp_millis().to_string());
            }
            if let Some(flag) = unread_only {
                query.append_pair("unreadOnly", if flag { "true" } else { "false" });
            }
            if let Some(value) = continuation.filter(|c| !c.is_empty()) {
                query.append_pair("continuation", value);
            }
            query.append_pair("count", STREAM_PAGE_SIZE);
            query.append_pair("streamId", resource.as_str());
        }
        Ok(url)
    }

    // ========================================================================
    // Request pipeline
    // ========================================================================

    /// Send one request, reauthorizing once on 401.
    async fn execute<F>(&self, build: F) -> Result<Response, TransportError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        if self.is_suspended() {
            return Err(TransportError::Suspended);
        }
        let before = self.credentials().ok_or(TransportError::MissingCredentials)?;

        match self.send_once(build(), &before).await {
            Err(TransportError::Unauthorized) => {}
            other => return other,
        }

        let Some(authorizer) = self.authorizer.as_ref() else {
            return Err(TransportError::Unauthorized);
        };

        let fresh = match authorizer.reauthorize(&before).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!(error = %e, "Reauthorization failed");
                return Err(TransportError::Unauthorized);
            }
        };
        if fresh.same_token(&before) {
            tracing::warn!("Reauthorization returned the same access token, not retrying");
            return Err(TransportError::Unauthorized);
        }

        let fresh = Arc::new(fresh);
        match self.credentials.write() {
            Ok(mut guard) => *guard = Some(Arc::clone(&fresh)),
            Err(poisoned) => *poisoned.into_inner() = Some(Arc::clone(&fresh)),
        }

        tracing::debug!("Retrying request with refreshed credentials");
        self.send_once(build(), &fresh).await
    }

    async fn send_once(
        &self,
        request: RequestBuilder,
        credentials: &Credentials,
    ) -> Result<Response, TransportError> {
        let mut suspended = self.suspended.subscribe();
        if *suspended.borrow_and_update() {
            return Err(TransportError::Suspended);
        }

        let request = request
            .header(ACCEPT, "application/json")
            .header(
                AUTHORIZATION,
                format!("OAuth {}", credentials.access_token.expose_secret()),
            )
            .send();

        let response = tokio::select! {
            result = request => result?,
            _ = suspended.wait_for(|s| *s) => return Err(TransportError::Suspended),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(match status.as_u16() {
            401 => TransportError::Unauthorized,
            404 => TransportError::NotFound(response.url().path().to_string()),
            code => TransportError::HttpStatus(code),
        })
    }

    async fn execute_json<T, F>(&self, build: F) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let response = self.execute(build).await?;
        Ok(response.json::<T>().await?)
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        self.http.request(method, url.clone())
    }
}

#[async_trait]
impl RemoteSyncClient for ApiClient {
    async fn get_collections(&self) -> Result<Vec<Collection>, TransportError> {
        let url = self.url("v3/collections")?;
        self.execute_json(|| self.request(Method::GET, &url)).await
    }

    async fn get_stream_ids(
        &self,
        resource: &ResourceId,
        continuation: Option<&str>,
        newer_than: Option<DateTime<Utc>>,
        unread_only: Option<bool>,
    ) -> Result<StreamIds, TransportError> {
        let url = self.stream_url("v3/streams/ids", resource, continuation, newer_than, unread_only)?;
        self.execute_json(|| self.request(Method::GET, &url)).await
    }

    async fn get_stream_contents(
        &self,
        resource: &ResourceId,
        continuation: Option<&str>,
        newer_than: Option<DateTime<Utc>>,
        unread_only: Option<bool>,
    ) -> Result<Stream, TransportError> {
        let url = self.stream_url("v3/streams/contents", resource, continuation, newer_than, unread_only)?;
        self.execute_json(|| self.request(Method::GET, &url)).await
    }

    async fn get_entries(&self, ids: &[String]) -> Result<Vec<Entry>, TransportError> {
        let url = self.url("v3/entries/.mget")?;
        let mut entries = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.entries_batch_size) {
            let page: Vec<Entry> = self
                .execute_json(|| self.request(Method::POST, &url).json(chunk))
                .await?;
            entries.extend(page);
        }
        Ok(entries)
    }

    async fn mark_articles(&self, ids: &[String], action: MarkAction) -> Result<(), TransportError> {
        let url = self.url("v3/markers")?;
        for chunk in ids.chunks(self.mark_batch_size) {
            let body = json!({
                "action": action.action_value(),
                "type": "entries",
                "entryIds": chunk,
            });
            self.execute(|| self.request(Method::POST, &url).json(&body)).await?;
        }
        Ok(())
    }

    async fn add_feed(
        &self,
        feed: &ResourceId,
        title: Option<&str>,
        collection_id: &str,
    ) -> Result<Vec<RemoteFeed>, TransportError> {
        let url = self.collection_url(collection_id, &["feeds"])?;
        let mut body = json!({ "id": feed.as_str() });
        if let Some(title) = title {
            body["title"] = json!(title);
        }
        self.execute_json(|| self.request(Method::PUT, &url).json(&body)).await
    }

    async fn remove_feed(&self, feed_id: &str, collection_id: &str) -> Result<(), TransportError> {
        let url = self.collection_url(collection_id, &["feeds", ".mdelete"])?;
        let body = json!([{ "id": feed_id }]);
        self.execute(|| self.request(Method::DELETE, &url).json(&body)).await?;
        Ok(())
    }

    async fn create_collection(&self, label: &str) -> Result<Collection, TransportError> {
        let url = self.url("v3/collections")?;
        let body = json!({ "label": label });
        let collections: Vec<Collection> = self
            .execute_json(|| self.request(Method::POST, &url).json(&body))
            .await?;
        collections
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Decode("empty collection response".into()))
    }

    async fn rename_collection(&self, collection_id: &str, label: &str) -> Result<Collection, TransportError> {
        let url = self.url("v3/collections")?;
        let body = json!({ "id": collection_id, "label": label });
        let collections: Vec<Collection> = self
            .execute_json(|| self.request(Method::POST, &url).json(&body))
            .await?;
        collections
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Decode("empty collection response".into()))
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<(), TransportError> {
        let url = self.collection_url(collection_id, &[])?;
        self.execute(|| self.request(Method::DELETE, &url)).await?;
        Ok(())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        let url = self.url("v3/auth/logout")?;
        self.execute(|| self.request(Method::POST, &url)).await?;
        Ok(())
    }

    fn suspend(&self) {
        tracing::info!("Suspending network access");
        self.suspended.send_replace(true);
    }

    fn resume(&self) {
        tracing::info!("Resuming network access");
        self.suspended.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        let base = Url::parse("https://cloud.example.com/").unwrap();
        ApiClient::with_http_client(reqwest::Client::new(), base)
    }

    #[test]
    fn test_collection_url_encodes_id() {
        let url = client()
            .collection_url("user/u1/category/tech", &["feeds", ".mdelete"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://cloud.example.com/v3/collections/user%2Fu1%2Fcategory%2Ftech/feeds/.mdelete"
        );
    }

    #[test]
    fn test_stream_url_query() {
        let newer = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        let url = client()
            .stream_url(
                "v3/streams/ids",
                &ResourceId::all("u1"),
                Some("next"),
                Some(newer),
                Some(true),
            )
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("newerThan".into(), "1700000000000".into())));
        assert!(pairs.contains(&("unreadOnly".into(), "true".into())));
        assert!(pairs.contains(&("continuation".into(), "next".into())));
        assert!(pairs.contains(&("streamId".into(), "user/u1/category/global.all".into())));
    }

    #[test]
    fn test_stream_url_skips_empty_continuation() {
        let url = client()
            .stream_url("v3/streams/ids", &ResourceId::all("u1"), Some(""), None, None)
            .unwrap();
        assert!(!url.query_pairs().any(|(k, _)| k == "continuation"));
    }

    #[tokio::test]
    async fn test_suspended_client_sends_nothing() {
        let client = client().with_credentials(Credentials::new("u1", "t"));
        client.suspend();
        assert!(matches!(
            client.get_collections().await,
            Err(TransportError::Suspended)
        ));
        client.resume();
        assert!(!client.is_suspended());
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        assert!(matches!(
            client().get_collections().await,
            Err(TransportError::MissingCredentials)
        ));
    }
}
