//! Wire models for the remote feed-aggregation API.
//!
//! Timestamps arrive as milliseconds since the Unix epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::{NewFeed, ParsedItem};
use crate::util::{sanitize_name, strip_rtl_wrapper};

// ============================================================================
// Resource Ids
// ============================================================================

/// Opaque identifier of a remote stream (a feed, category or tag).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Every article in the account
    pub fn all(user_id: &str) -> Self {
        Self(format!("user/{user_id}/category/global.all"))
    }

    /// Starred articles
    pub fn saved(user_id: &str) -> Self {
        Self(format!("user/{user_id}/tag/global.saved"))
    }

    /// Feed resource for a subscription URL
    pub fn feed(url: &str) -> Self {
        Self(format!("feed/{url}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The subscription URL of a feed resource, or the raw id otherwise.
    pub fn feed_url(&self) -> &str {
        self.0.strip_prefix("feed/").unwrap_or(&self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Collections and Feeds
// ============================================================================

/// A remote collection, mirrored locally as a folder.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Collection {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub feeds: Vec<RemoteFeed>,
}

impl Collection {
    pub fn folder_name(&self) -> String {
        sanitize_name(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteFeed {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub website: Option<String>,
}

impl RemoteFeed {
    pub fn display_title(&self) -> String {
        self.title.as_deref().map(sanitize_name).unwrap_or_default()
    }

    pub fn to_new_feed(&self) -> NewFeed {
        NewFeed {
            feed_id: self.id.clone(),
            title: self.display_title(),
            url: ResourceId::new(self.id.clone()).feed_url().to_string(),
            home_page_url: self.website.clone(),
        }
    }
}

// ============================================================================
// Streams
// ============================================================================

/// One page of article ids.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamIds {
    #[serde(default)]
    pub continuation: Option<String>,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// One page of article contents.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Stream {
    pub id: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub continuation: Option<String>,
    #[serde(default)]
    pub items: Vec<Entry>,
}

// ============================================================================
// Entries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default, rename = "type")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tag {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// An article as returned by the entries and stream-contents endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub summary: Option<Content>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub crawled: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub recrawled: Option<DateTime<Utc>>,
    #[serde(default)]
    pub origin: Option<Origin>,
    #[serde(default)]
    pub canonical: Option<Vec<Link>>,
    #[serde(default)]
    pub alternate: Option<Vec<Link>>,
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub tags: Option<Vec<Tag>>,
}

impl Entry {
    /// The feed this entry belongs to. Entries without one cannot be stored.
    pub fn feed_id(&self) -> Option<&str> {
        self.origin.as_ref()?.stream_id.as_deref()
    }

    /// First canonical or alternate link that points at a web page.
    pub fn external_url(&self) -> Option<&str> {
        self.canonical
            .iter()
            .chain(self.alternate.iter())
            .flatten()
            .find(|link| matches!(link.mime_type.as_deref(), None | Some("text/html")))
            .map(|link| link.href.as_str())
    }

    pub fn parsed_item(&self) -> Option<ParsedItem> {
        let Some(feed_id) = self.feed_id() else {
            tracing::warn!(entry_id = %self.id, "Dropping entry without origin stream");
            return None;
        };

        let content_html = self
            .content
            .as_ref()
            .and_then(|c| c.content.clone())
            .or_else(|| self.summary.as_ref().and_then(|s| s.content.clone()));

        Some(ParsedItem {
            article_id: self.id.clone(),
            feed_id: feed_id.to_string(),
            title: self.title.as_deref().map(|t| strip_rtl_wrapper(t).into_owned()),
            url: None,
            external_url: self.external_url().map(str::to_string),
            content_html,
            summary: self
                .summary
                .as_ref()
                .and_then(|s| s.content.as_deref())
                .map(|s| strip_rtl_wrapper(s).into_owned()),
            author: self.author.clone(),
            date_published: Some(self.crawled),
            date_modified: self.recrawled,
        })
    }
}

// ============================================================================
// Markers
// ============================================================================

/// Status change sent to the markers endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkAction {
    Read,
    Unread,
    Saved,
    Unsaved,
}

impl MarkAction {
    /// Value of the `action` field in the markers request body
    pub fn action_value(self) -> &'static str {
        match self {
            MarkAction::Read => "markAsRead",
            MarkAction::Unread => "keepUnread",
            MarkAction::Saved => "markAsSaved",
            MarkAction::Unsaved => "markAsUnsaved",
        }
    }
}

impl fmt::Display for MarkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_value())
    }
}
