//! feedsync: mirrors a feed-aggregation account into a local SQLite store
//! and pushes local read/starred changes back.

pub mod config;
pub mod engine;
pub mod remote;
pub mod storage;
pub mod util;
