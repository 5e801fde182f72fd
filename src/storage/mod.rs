mod account;
mod articles;
mod feeds;
mod folders;
mod pending;
mod schema;
mod statuses;
mod store;
mod types;

pub use schema::Database;
pub use store::LocalStore;
pub use types::{
    Article, ArticleStatus, DatabaseError, Feed, Folder, NewFeed, ParsedItem, PendingStatus,
    StatusKey,
};
