//! Individual sync stages run through a real queue against the fake remote.

mod common;

use pretty_assertions::assert_eq;
use std::collections::HashSet;

use common::{collection, entry, env, remote_feed, set, test_db, Call, FakeRemote, USER};
use feedsync::engine::stages::{
    FetchUpdatedArticleIds, IngestArticleIds, MaterializeFeeds, MirrorFolders, ReconcileStatuses,
    SendArticleStatuses, StatusKind, SyncStreamContents,
};
use feedsync::engine::{CancelFlag, Enqueue, Operation, OperationQueue, Outcome, Shared, SyncError};
use feedsync::remote::{MarkAction, ResourceId};
use feedsync::storage::{Database, PendingStatus, StatusKey};

const F1: &str = "feed/https://one.example.com/rss";
const F2: &str = "feed/https://two.example.com/rss";
const F3: &str = "feed/https://three.example.com/rss";

async fn run(operation: impl Operation + 'static) -> Outcome {
    OperationQueue::spawn().run(Enqueue::new(operation)).await
}

async fn folder_named(db: &Database, name: &str) -> i64 {
    db.folders()
        .await
        .unwrap()
        .into_iter()
        .find(|f| f.name == name)
        .map(|f| f.id)
        .unwrap()
}

// ============================================================================
// Status Reconciliation
// ============================================================================

#[tokio::test]
async fn test_unread_reconcile_pages_and_applies_both_directions() {
    let db = test_db().await;
    let remote = FakeRemote::with(|state| {
        state.unread_ids = vec!["a".into(), "b".into(), "c".into()];
        state.page_size = 2;
    });
    db.mark(&set(&["b", "d"]), StatusKey::Read, false).await.unwrap();

    let delta = ReconcileStatuses::new(env(&db, &remote), StatusKind::Unread)
        .reconcile(&CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(delta.to_set, set(&["a", "c"]));
    assert_eq!(delta.to_clear, set(&["d"]));
    assert_eq!(db.fetch_unread_article_ids().await.unwrap(), set(&["a", "b", "c"]));

    let all = ResourceId::all(USER).to_string();
    assert_eq!(
        remote.stream_id_calls(),
        vec![
            Call::StreamIds {
                resource: all.clone(),
                continuation: None,
                newer_than: None,
                unread_only: Some(true),
            },
            Call::StreamIds {
                resource: all,
                continuation: Some("2".into()),
                newer_than: None,
                unread_only: Some(true),
            },
        ]
    );
}

#[tokio::test]
async fn test_starred_reconcile_keeps_pending_changes() {
    let db = test_db().await;
    let remote = FakeRemote::with(|state| state.starred_ids = vec!["x".into(), "y".into()]);
    db.mark(&set(&["z"]), StatusKey::Starred, true).await.unwrap();
    // Locally unstarred x and starred z, neither pushed yet.
    db.mark(&set(&["x"]), StatusKey::Starred, false).await.unwrap();
    db.insert_pending_statuses(&[
        PendingStatus::new("x", StatusKey::Starred, false),
        PendingStatus::new("z", StatusKey::Starred, true),
    ])
    .await
    .unwrap();

    let outcome = run(ReconcileStatuses::new(env(&db, &remote), StatusKind::Starred)).await;

    assert!(matches!(outcome, Outcome::Succeeded));
    assert_eq!(db.fetch_starred_article_ids().await.unwrap(), set(&["y", "z"]));
    assert_eq!(
        remote.stream_id_calls(),
        vec![Call::StreamIds {
            resource: ResourceId::saved(USER).to_string(),
            continuation: None,
            newer_than: None,
            unread_only: None,
        }]
    );
}

#[tokio::test]
async fn test_canceled_reconcile_changes_nothing() {
    let db = test_db().await;
    let remote = FakeRemote::with(|state| state.unread_ids = vec!["a".into()]);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let result = ReconcileStatuses::new(env(&db, &remote), StatusKind::Unread)
        .reconcile(&cancel)
        .await;

    assert!(matches!(result, Err(SyncError::Canceled)));
    assert!(db.fetch_unread_article_ids().await.unwrap().is_empty());
}

// ============================================================================
// Status Push
// ============================================================================

fn read_records(count: usize) -> Vec<PendingStatus> {
    (0..count)
        .map(|i| PendingStatus::new(format!("id{i:03}"), StatusKey::Read, true))
        .collect()
}

#[tokio::test]
async fn test_send_statuses_splits_into_batches() {
    let db = test_db().await;
    let remote = FakeRemote::new();
    db.insert_pending_statuses(&read_records(301)).await.unwrap();

    let outcome = run(SendArticleStatuses::new(env(&db, &remote)).with_batch_size(300)).await;

    assert!(matches!(outcome, Outcome::Succeeded));
    let sizes: Vec<usize> = remote.mark_calls().iter().map(|(ids, _)| ids.len()).collect();
    assert_eq!(sizes, vec![300, 1]);
    assert!(remote.mark_calls().iter().all(|(_, action)| *action == MarkAction::Read));
    assert_eq!(db.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rejected_batch_stays_pending_for_next_push() {
    let db = test_db().await;
    let remote = FakeRemote::with(|state| state.fail_mark_call = Some(2));
    db.insert_pending_statuses(&read_records(301)).await.unwrap();

    let outcome = run(SendArticleStatuses::new(env(&db, &remote)).with_batch_size(300)).await;

    // A rejected batch does not fail the push.
    assert!(matches!(outcome, Outcome::Succeeded));
    assert_eq!(db.pending_count().await.unwrap(), 1);
    assert_eq!(db.pending_article_ids(StatusKey::Read).await.unwrap(), set(&["id300"]));

    remote.clear_calls();
    run(SendArticleStatuses::new(env(&db, &remote)).with_batch_size(300)).await;
    assert_eq!(remote.mark_calls(), vec![(vec!["id300".to_string()], MarkAction::Read)]);
    assert_eq!(db.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_send_statuses_groups_by_action() {
    let db = test_db().await;
    let remote = FakeRemote::new();
    db.insert_pending_statuses(&[
        PendingStatus::new("s1", StatusKey::Starred, false),
        PendingStatus::new("r1", StatusKey::Read, false),
        PendingStatus::new("s2", StatusKey::Starred, true),
        PendingStatus::new("r2", StatusKey::Read, true),
    ])
    .await
    .unwrap();

    run(SendArticleStatuses::new(env(&db, &remote))).await;

    let actions: Vec<MarkAction> = remote.mark_calls().into_iter().map(|(_, a)| a).collect();
    assert_eq!(
        actions,
        vec![MarkAction::Read, MarkAction::Unread, MarkAction::Saved, MarkAction::Unsaved]
    );
}

#[tokio::test]
async fn test_send_statuses_without_pending_makes_no_request() {
    let db = test_db().await;
    let remote = FakeRemote::new();

    run(SendArticleStatuses::new(env(&db, &remote))).await;

    assert!(remote.calls().is_empty());
}

// ============================================================================
// Folders and Feeds
// ============================================================================

#[tokio::test]
async fn test_mirror_folders_hoists_feeds_of_removed_folder() {
    let db = test_db().await;
    let remote = FakeRemote::new();
    db.create_feed(&remote_feed(F1, "One").to_new_feed()).await.unwrap();
    let tech = db.ensure_folder("Tech", Some("c1")).await.unwrap();
    db.add_feed_to_folder(F1, tech.id).await.unwrap();
    db.ensure_folder("Unlinked", None).await.unwrap();

    let collections = Shared::new(vec![collection("c2", "News", vec![])]);
    let outcome = run(MirrorFolders::new(env(&db, &remote), collections)).await;

    assert!(matches!(outcome, Outcome::Succeeded));
    let folders = db.folders().await.unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].name, "News");
    assert_eq!(folders[0].external_id.as_deref(), Some("c2"));
    assert!(db.root_feed_ids().await.unwrap().contains(F1));
}

#[tokio::test]
async fn test_materialize_feeds_moves_retitles_and_removes() {
    let db = test_db().await;
    let remote = FakeRemote::new();
    for (id, title) in [(F1, "One"), (F2, "Two"), (F3, "Three")] {
        db.create_feed(&remote_feed(id, title).to_new_feed()).await.unwrap();
    }
    let tech = db.ensure_folder("Tech", Some("c1")).await.unwrap();
    for id in [F1, F2, F3] {
        db.add_feed_to_folder(id, tech.id).await.unwrap();
    }

    let collections = Shared::new(vec![
        collection("c1", "Tech", vec![remote_feed(F1, "Renamed")]),
        collection("c2", "News", vec![remote_feed(F2, "Two")]),
    ]);
    run(MirrorFolders::new(env(&db, &remote), collections.clone())).await;
    let outcome = run(MaterializeFeeds::new(env(&db, &remote), collections)).await;

    assert!(matches!(outcome, Outcome::Succeeded));
    let news = folder_named(&db, "News").await;
    assert_eq!(db.feed_ids_in_folder(tech.id).await.unwrap(), set(&[F1]));
    assert_eq!(db.feed_ids_in_folder(news).await.unwrap(), set(&[F2]));
    assert_eq!(db.existing_feed(F1).await.unwrap().unwrap().title, "Renamed");
    assert!(db.existing_feed(F3).await.unwrap().is_none());
}

#[tokio::test]
async fn test_feed_in_unmirrored_collection_is_kept() {
    let db = test_db().await;
    let remote = FakeRemote::new();
    db.create_feed(&remote_feed(F1, "One").to_new_feed()).await.unwrap();

    // No folder exists for c9, but its feeds are still subscriptions.
    let collections = Shared::new(vec![collection("c9", "Elsewhere", vec![remote_feed(F1, "One")])]);
    run(MaterializeFeeds::new(env(&db, &remote), collections)).await;

    assert!(db.existing_feed(F1).await.unwrap().is_some());
}

// ============================================================================
// Article Ids and Contents
// ============================================================================

#[tokio::test]
async fn test_ingest_creates_unread_statuses_only_for_new_ids() {
    let db = test_db().await;
    let remote = FakeRemote::with(|state| {
        state.all_ids = vec!["a".into(), "b".into(), "c".into()];
        state.page_size = 2;
    });
    db.mark(&set(&["a"]), StatusKey::Read, true).await.unwrap();

    let outcome = run(IngestArticleIds::new(env(&db, &remote))).await;

    assert!(matches!(outcome, Outcome::Succeeded));
    assert!(db.status("a").await.unwrap().unwrap().read);
    assert_eq!(db.fetch_unread_article_ids().await.unwrap(), set(&["b", "c"]));
    assert_eq!(remote.stream_id_calls().len(), 2);
}

#[tokio::test]
async fn test_updated_ids_without_previous_sync_makes_no_request() {
    let db = test_db().await;
    let remote = FakeRemote::with(|state| state.updated_ids = vec!["a".into()]);
    let output: Shared<HashSet<String>> = Shared::default();

    let outcome = run(FetchUpdatedArticleIds::new(env(&db, &remote), None, output.clone())).await;

    assert!(matches!(outcome, Outcome::Succeeded));
    assert!(output.get().is_empty());
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_updated_ids_since_last_sync() {
    let db = test_db().await;
    let remote = FakeRemote::with(|state| state.updated_ids = vec!["a".into(), "b".into()]);
    let output: Shared<HashSet<String>> = Shared::default();
    let since = chrono::Utc::now() - chrono::Duration::hours(1);

    run(FetchUpdatedArticleIds::new(env(&db, &remote), Some(since), output.clone())).await;

    assert_eq!(output.get(), set(&["a", "b"]));
    assert!(matches!(
        remote.stream_id_calls().as_slice(),
        [Call::StreamIds { newer_than: Some(t), .. }] if *t == since
    ));
}

#[tokio::test]
async fn test_stream_contents_stores_articles_and_respects_pending() {
    let db = test_db().await;
    let remote = FakeRemote::with(|state| state.page_size = 1);
    remote.add_entries(vec![entry("e1", F1), entry("e2", F1), entry("other", F2)]);
    db.create_feed(&remote_feed(F1, "One").to_new_feed()).await.unwrap();
    db.insert_pending_statuses(&[PendingStatus::new("e2", StatusKey::Read, true)])
        .await
        .unwrap();

    let resource = ResourceId::new(F1);
    let outcome = run(SyncStreamContents::new(env(&db, &remote), resource)).await;

    assert!(matches!(outcome, Outcome::Succeeded));
    assert!(db.article("e1").await.unwrap().is_some());
    assert!(db.article("e2").await.unwrap().is_some());
    assert!(db.article("other").await.unwrap().is_none());
    assert_eq!(db.fetch_unread_article_ids().await.unwrap(), set(&["e1"]));

    let continuations: Vec<Option<String>> = remote
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::StreamContents { continuation, .. } => Some(continuation),
            _ => None,
        })
        .collect();
    assert_eq!(continuations, vec![None, Some("1".to_string())]);
}
