//! Sequential continuation-based paging.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::future::Future;

use super::error::SyncError;
use super::operation::CancelFlag;
use crate::remote::{Entry, RemoteSyncClient, ResourceId, Stream, StreamIds};

/// One page of a paged listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continuation: Option<String>,
}

impl From<StreamIds> for Page<String> {
    fn from(page: StreamIds) -> Self {
        Self {
            items: page.ids,
            continuation: page.continuation,
        }
    }
}

impl From<Stream> for Page<Entry> {
    fn from(page: Stream) -> Self {
        Self {
            items: page.items,
            continuation: page.continuation,
        }
    }
}

/// Stream filters shared by the id and content listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamFilter {
    pub newer_than: Option<DateTime<Utc>>,
    pub unread_only: Option<bool>,
}

/// Fetch pages until the continuation runs out and return every item.
///
/// Each request waits for the previous page, since a continuation is only
/// valid once its page has been seen. An absent or empty continuation ends
/// the listing, as does `paging == false` after the first page. Any failed
/// page fails the whole fetch.
pub async fn paginate<T, F, Fut>(cancel: &CancelFlag, paging: bool, mut fetch_page: F) -> Result<Vec<T>, SyncError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, SyncError>>,
{
    let mut items = Vec::new();
    let mut continuation: Option<String> = None;
    let mut pages = 0usize;

    loop {
        if cancel.is_canceled() {
            return Err(SyncError::Canceled);
        }

        let page = fetch_page(continuation.take()).await?;
        pages += 1;
        items.extend(page.items);

        match page.continuation.filter(|c| !c.is_empty()) {
            Some(next) if paging => continuation = Some(next),
            _ => break,
        }
    }

    tracing::trace!(pages, items = items.len(), "Paged fetch finished");
    Ok(items)
}

/// All article ids of a stream, across every page.
pub async fn fetch_stream_ids(
    remote: &dyn RemoteSyncClient,
    resource: &ResourceId,
    filter: StreamFilter,
    cancel: &CancelFlag,
) -> Result<HashSet<String>, SyncError> {
    let ids = paginate(cancel, true, |continuation| async move {
        remote
            .get_stream_ids(resource, continuation.as_deref(), filter.newer_than, filter.unread_only)
            .await
            .map(Page::from)
            .map_err(SyncError::from)
    })
    .await?;
    Ok(ids.into_iter().collect())
}

/// All entries of a stream, across every page.
pub async fn fetch_stream_contents(
    remote: &dyn RemoteSyncClient,
    resource: &ResourceId,
    filter: StreamFilter,
    cancel: &CancelFlag,
) -> Result<Vec<Entry>, SyncError> {
    paginate(cancel, true, |continuation| async move {
        remote
            .get_stream_contents(resource, continuation.as_deref(), filter.newer_than, filter.unread_only)
            .await
            .map(Page::from)
            .map_err(SyncError::from)
    })
    .await
}
