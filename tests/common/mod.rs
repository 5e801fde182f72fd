//! Shared fixtures: an in-memory database and a scripted fake remote.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use feedsync::engine::stages::SyncEnv;
use feedsync::remote::{
    Collection, Entry, MarkAction, RemoteFeed, RemoteSyncClient, ResourceId, Stream, StreamIds,
    TransportError,
};
use feedsync::storage::Database;

pub const USER: &str = "user-1";

pub async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

pub fn set(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

pub fn env(db: &Database, remote: &Arc<FakeRemote>) -> SyncEnv {
    SyncEnv::new(Arc::new(db.clone()), remote.clone(), USER)
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn remote_feed(id: &str, title: &str) -> RemoteFeed {
    RemoteFeed {
        id: id.to_string(),
        title: Some(title.to_string()),
        updated: None,
        website: Some(format!("https://{}.example.com", title.to_lowercase())),
    }
}

pub fn collection(id: &str, label: &str, feeds: Vec<RemoteFeed>) -> Collection {
    Collection {
        id: id.to_string(),
        label: label.to_string(),
        feeds,
    }
}

pub fn entry(id: &str, feed_id: &str) -> Entry {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "title": format!("Article {id}"),
        "content": {"content": format!("<p>{id}</p>")},
        "crawled": 1_700_000_000_000i64,
        "origin": {"streamId": feed_id, "title": "Feed"},
        "alternate": [{"href": format!("https://example.com/{id}"), "type": "text/html"}],
        "unread": true
    }))
    .unwrap()
}

// ============================================================================
// Fake Remote
// ============================================================================

/// A request the fake received.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Collections,
    StreamIds {
        resource: String,
        continuation: Option<String>,
        newer_than: Option<DateTime<Utc>>,
        unread_only: Option<bool>,
    },
    StreamContents {
        resource: String,
        continuation: Option<String>,
    },
    Entries(Vec<String>),
    Mark(Vec<String>, MarkAction),
    AddFeed(String, String),
    RemoveFeed(String, String),
    CreateCollection(String),
    RenameCollection(String, String),
    DeleteCollection(String),
    Logout,
}

#[derive(Default)]
pub struct RemoteState {
    pub collections: Vec<Collection>,
    pub all_ids: Vec<String>,
    pub unread_ids: Vec<String>,
    pub starred_ids: Vec<String>,
    /// Returned for `newer_than` requests on the all stream
    pub updated_ids: Vec<String>,
    pub entries: HashMap<String, Entry>,
    /// Ids per page; 0 means everything in one page
    pub page_size: usize,
    /// 1-based index of the mark call that fails
    pub fail_mark_call: Option<usize>,
    pub fail_collections: Option<TransportError>,
    pub fail_starred: Option<TransportError>,
    pub fail_updated: Option<TransportError>,
    pub fail_rename: bool,
    pub calls: Vec<Call>,
}

/// In-memory [`RemoteSyncClient`] with scripted responses.
#[derive(Default)]
pub struct FakeRemote {
    pub state: Mutex<RemoteState>,
    /// When set, `get_collections` waits for a notification first.
    pub collections_gate: Mutex<Option<Arc<Notify>>>,
    /// Notified when a gated `get_collections` call has started.
    pub collections_started: Notify,
    /// Same as `collections_gate`, for `get_stream_contents`.
    pub contents_gate: Mutex<Option<Arc<Notify>>>,
    pub contents_started: Notify,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(f: impl FnOnce(&mut RemoteState)) -> Arc<Self> {
        let remote = Self::default();
        f(&mut remote.state.lock().unwrap());
        Arc::new(remote)
    }

    pub fn update(&self, f: impl FnOnce(&mut RemoteState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn add_entries(&self, entries: Vec<Entry>) {
        let mut state = self.state.lock().unwrap();
        for entry in entries {
            state.all_ids.push(entry.id.clone());
            state.entries.insert(entry.id.clone(), entry);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn mark_calls(&self) -> Vec<(Vec<String>, MarkAction)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Mark(ids, action) => Some((ids, action)),
                _ => None,
            })
            .collect()
    }

    pub fn entry_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Entries(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn stream_id_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::StreamIds { .. }))
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

/// Continuations are the offset of the next page.
fn page_of<T: Clone>(items: &[T], continuation: Option<&str>, page_size: usize) -> (Vec<T>, Option<String>) {
    let start: usize = continuation.and_then(|c| c.parse().ok()).unwrap_or(0);
    if page_size == 0 {
        return (items.get(start..).unwrap_or_default().to_vec(), None);
    }
    let end = (start + page_size).min(items.len());
    let page = items.get(start..end).unwrap_or_default().to_vec();
    let next = (end < items.len()).then(|| end.to_string());
    (page, next)
}

#[async_trait]
impl RemoteSyncClient for FakeRemote {
    async fn get_collections(&self) -> Result<Vec<Collection>, TransportError> {
        self.record(Call::Collections);
        let gate = self.collections_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.collections_started.notify_one();
            gate.notified().await;
        }
        let state = self.state.lock().unwrap();
        match &state.fail_collections {
            Some(e) => Err(e.clone()),
            None => Ok(state.collections.clone()),
        }
    }

    async fn get_stream_ids(
        &self,
        resource: &ResourceId,
        continuation: Option<&str>,
        newer_than: Option<DateTime<Utc>>,
        unread_only: Option<bool>,
    ) -> Result<StreamIds, TransportError> {
        self.record(Call::StreamIds {
            resource: resource.to_string(),
            continuation: continuation.map(str::to_string),
            newer_than,
            unread_only,
        });
        tokio::task::yield_now().await;

        let state = self.state.lock().unwrap();
        let ids = if *resource == ResourceId::saved(USER) {
            if let Some(e) = &state.fail_starred {
                return Err(e.clone());
            }
            &state.starred_ids
        } else if unread_only == Some(true) {
            &state.unread_ids
        } else if newer_than.is_some() {
            if let Some(e) = &state.fail_updated {
                return Err(e.clone());
            }
            &state.updated_ids
        } else {
            &state.all_ids
        };

        let (ids, continuation) = page_of(ids, continuation, state.page_size);
        Ok(StreamIds { continuation, ids })
    }

    async fn get_stream_contents(
        &self,
        resource: &ResourceId,
        continuation: Option<&str>,
        _newer_than: Option<DateTime<Utc>>,
        _unread_only: Option<bool>,
    ) -> Result<Stream, TransportError> {
        self.record(Call::StreamContents {
            resource: resource.to_string(),
            continuation: continuation.map(str::to_string),
        });
        let gate = self.contents_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.contents_started.notify_one();
            gate.notified().await;
        }

        let state = self.state.lock().unwrap();
        let mut items: Vec<Entry> = state
            .entries
            .values()
            .filter(|e| e.feed_id() == Some(resource.as_str()))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));

        let (items, continuation) = page_of(&items, continuation, state.page_size);
        Ok(Stream {
            id: resource.to_string(),
            updated: None,
            continuation,
            items,
        })
    }

    async fn get_entries(&self, ids: &[String]) -> Result<Vec<Entry>, TransportError> {
        self.record(Call::Entries(ids.to_vec()));
        let state = self.state.lock().unwrap();
        Ok(ids.iter().filter_map(|id| state.entries.get(id).cloned()).collect())
    }

    async fn mark_articles(&self, ids: &[String], action: MarkAction) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Mark(ids.to_vec(), action));
        let index = state.calls.iter().filter(|c| matches!(c, Call::Mark(..))).count();
        if state.fail_mark_call == Some(index) {
            return Err(TransportError::HttpStatus(500));
        }

        let apply = |list: &mut Vec<String>, on: bool| {
            list.retain(|id| !ids.contains(id));
            if on {
                list.extend(ids.iter().cloned());
            }
        };
        match action {
            MarkAction::Read => apply(&mut state.unread_ids, false),
            MarkAction::Unread => apply(&mut state.unread_ids, true),
            MarkAction::Saved => apply(&mut state.starred_ids, true),
            MarkAction::Unsaved => apply(&mut state.starred_ids, false),
        }
        Ok(())
    }

    async fn add_feed(
        &self,
        feed: &ResourceId,
        title: Option<&str>,
        collection_id: &str,
    ) -> Result<Vec<RemoteFeed>, TransportError> {
        self.record(Call::AddFeed(feed.to_string(), collection_id.to_string()));
        let mut state = self.state.lock().unwrap();
        let collection = state
            .collections
            .iter_mut()
            .find(|c| c.id == collection_id)
            .ok_or_else(|| TransportError::NotFound(collection_id.to_string()))?;
        collection.feeds.retain(|f| f.id != feed.as_str());
        collection
            .feeds
            .push(remote_feed(feed.as_str(), title.unwrap_or("Added")));
        Ok(collection.feeds.clone())
    }

    async fn remove_feed(&self, feed_id: &str, collection_id: &str) -> Result<(), TransportError> {
        self.record(Call::RemoveFeed(feed_id.to_string(), collection_id.to_string()));
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.collections.iter_mut().find(|c| c.id == collection_id) {
            c.feeds.retain(|f| f.id != feed_id);
        }
        Ok(())
    }

    async fn create_collection(&self, label: &str) -> Result<Collection, TransportError> {
        self.record(Call::CreateCollection(label.to_string()));
        let created = collection(&format!("user/{USER}/category/{label}"), label, vec![]);
        self.state.lock().unwrap().collections.push(created.clone());
        Ok(created)
    }

    async fn rename_collection(&self, collection_id: &str, label: &str) -> Result<Collection, TransportError> {
        self.record(Call::RenameCollection(collection_id.to_string(), label.to_string()));
        let mut state = self.state.lock().unwrap();
        if state.fail_rename {
            return Err(TransportError::HttpStatus(500));
        }
        let c = state
            .collections
            .iter_mut()
            .find(|c| c.id == collection_id)
            .ok_or_else(|| TransportError::NotFound(collection_id.to_string()))?;
        c.label = label.to_string();
        Ok(c.clone())
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<(), TransportError> {
        self.record(Call::DeleteCollection(collection_id.to_string()));
        self.state.lock().unwrap().collections.retain(|c| c.id != collection_id);
        Ok(())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.record(Call::Logout);
        Ok(())
    }

    fn suspend(&self) {}

    fn resume(&self) {}
}
