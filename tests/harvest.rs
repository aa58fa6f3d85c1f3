//! Harvest Integration Tests
//!
//! Drives the harvester with a scripted feed to check the stopping rules.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use likevault::adapters::{FeedError, FeedPage, FeedSource};
use likevault::core::{Harvester, StopReason};
use serde_json::{json, Value};

/// Feed that replays a fixed list of page responses, then empty pages
struct ScriptedFeed {
    pages: Mutex<VecDeque<Result<FeedPage, FeedError>>>,
    calls: AtomicUsize,
}

impl ScriptedFeed {
    fn new(pages: Vec<Result<FeedPage, FeedError>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_page(&self, _cursor: Option<&str>, _page_size: u32) -> Result<FeedPage, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FeedPage::default()))
    }
}

fn post(id: &str) -> Value {
    json!({
        "entryId": format!("tweet-{}", id),
        "content": {
            "itemContent": {
                "tweet_results": { "result": { "__typename": "Tweet", "rest_id": id } }
            }
        }
    })
}

fn page(ids: &[&str], cursor: Option<&str>) -> Result<FeedPage, FeedError> {
    Ok(FeedPage {
        entries: ids.iter().map(|id| post(id)).collect(),
        cursor: cursor.map(str::to_string),
    })
}

fn known(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn ids(window: &[likevault::Record]) -> Vec<&str> {
    window.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn test_known_streak_stops_without_next_page() {
    let feed = ScriptedFeed::new(vec![
        page(&["n1", "k1", "k2", "k3", "k4"], Some("c1")),
        page(&["n2"], Some("c2")),
    ]);
    let known = known(&["k1", "k2", "k3", "k4"]);

    let outcome = Harvester::new(&feed, &known).harvest(3, 20).await;

    // The record completing the streak is not appended
    assert_eq!(ids(&outcome.window), vec!["n1", "k1", "k2"]);
    assert!(matches!(outcome.stop_reason, StopReason::KnownStreak { limit: 3 }));
    assert_eq!(feed.calls(), 1);
    assert_eq!(outcome.pages, 1);
}

#[tokio::test]
async fn test_unknown_record_resets_streak() {
    let feed = ScriptedFeed::new(vec![
        page(&["k1", "k2", "n1", "k3"], Some("c1")),
        page(&["k4", "n2"], Some("c2")),
    ]);
    let known = known(&["k1", "k2", "k3", "k4"]);

    let outcome = Harvester::new(&feed, &known).harvest(3, 20).await;

    assert_eq!(ids(&outcome.window), vec!["k1", "k2", "n1", "k3", "k4", "n2"]);
    assert!(matches!(outcome.stop_reason, StopReason::Exhausted));
    assert_eq!(feed.calls(), 3);
}

#[tokio::test]
async fn test_streak_spans_pages() {
    let feed = ScriptedFeed::new(vec![
        page(&["n1", "k1"], Some("c1")),
        page(&["k2", "k3"], Some("c2")),
    ]);
    let known = known(&["k1", "k2", "k3"]);

    let outcome = Harvester::new(&feed, &known).harvest(3, 20).await;

    assert_eq!(ids(&outcome.window), vec!["n1", "k1", "k2"]);
    assert!(matches!(outcome.stop_reason, StopReason::KnownStreak { .. }));
    assert_eq!(feed.calls(), 2);
}

#[tokio::test]
async fn test_failed_page_keeps_partial_window() {
    let feed = ScriptedFeed::new(vec![
        page(&["n1", "n2"], Some("c1")),
        Err(FeedError::Status { status: 503 }),
        page(&["n3"], Some("c3")),
    ]);
    let known = HashSet::new();

    let outcome = Harvester::new(&feed, &known).harvest(50, 20).await;

    assert_eq!(ids(&outcome.window), vec!["n1", "n2"]);
    assert!(matches!(
        outcome.stop_reason,
        StopReason::FetchFailed(FeedError::Status { status: 503 })
    ));
    assert_eq!(feed.calls(), 2);
}

#[tokio::test]
async fn test_repeated_cursor_terminates() {
    let feed = ScriptedFeed::new(vec![
        page(&["n1"], Some("same")),
        page(&["n2"], Some("same")),
        page(&["n3"], Some("next")),
    ]);
    let known = HashSet::new();

    let outcome = Harvester::new(&feed, &known).harvest(50, 20).await;

    assert_eq!(ids(&outcome.window), vec!["n1", "n2"]);
    assert!(matches!(outcome.stop_reason, StopReason::CursorStalled));
    assert_eq!(feed.calls(), 2);
}

#[tokio::test]
async fn test_missing_cursor_terminates() {
    let feed = ScriptedFeed::new(vec![page(&["n1"], None), page(&["n2"], Some("c"))]);
    let known = HashSet::new();

    let outcome = Harvester::new(&feed, &known).harvest(50, 20).await;

    assert_eq!(ids(&outcome.window), vec!["n1"]);
    assert!(matches!(outcome.stop_reason, StopReason::CursorStalled));
    assert_eq!(feed.calls(), 1);
}

#[tokio::test]
async fn test_invalid_entries_do_not_touch_streak() {
    let cursor_entry = json!({"entryId": "cursor-bottom-0", "content": {"value": "c1"}});
    let tombstone = json!({
        "content": {"itemContent": {"tweet_results": {"result": {"__typename": "TweetTombstone"}}}}
    });
    let feed = ScriptedFeed::new(vec![Ok(FeedPage {
        entries: vec![post("k1"), tombstone, post("k2"), cursor_entry, post("n1")],
        cursor: Some("c1".to_string()),
    })]);
    let known = known(&["k1", "k2"]);

    let outcome = Harvester::new(&feed, &known).harvest(2, 20).await;

    // Invalid entries neither reset nor extend the streak
    assert_eq!(ids(&outcome.window), vec!["k1"]);
    assert!(matches!(outcome.stop_reason, StopReason::KnownStreak { limit: 2 }));
}

#[tokio::test]
async fn test_empty_first_page() {
    let feed = ScriptedFeed::new(vec![]);
    let known = HashSet::new();

    let outcome = Harvester::new(&feed, &known).harvest(50, 20).await;

    assert!(outcome.window.is_empty());
    assert!(matches!(outcome.stop_reason, StopReason::Exhausted));
}
