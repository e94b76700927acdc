use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tasklist::backend::BackendError;
use tasklist::feed::{FeedEvent, RawTaskDocument, SnapshotSource, spawn_polling};

/// Serves whatever `next` holds and counts how often it was asked.
struct ScriptedSource {
    polls: AtomicUsize,
    next: Mutex<Result<Vec<RawTaskDocument>, String>>,
}

impl ScriptedSource {
    fn new(docs: Vec<RawTaskDocument>) -> Arc<Self> {
        Arc::new(Self {
            polls: AtomicUsize::new(0),
            next: Mutex::new(Ok(docs)),
        })
    }

    fn serve(&self, next: Result<Vec<RawTaskDocument>, String>) {
        *self.next.lock().unwrap() = next;
    }

    fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch_documents(&self) -> Result<Vec<RawTaskDocument>, BackendError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.next.lock().unwrap().clone().map_err(|message| BackendError::Api {
            status: 503,
            message,
        })
    }
}

fn raw(id: &str, title: &str) -> RawTaskDocument {
    RawTaskDocument {
        id: id.to_string(),
        title: Some(title.to_string()),
        created_at: Some(Utc::now()),
        ..RawTaskDocument::default()
    }
}

async fn next_event(feed: &mut tasklist::feed::ChangeFeed) -> Option<FeedEvent> {
    tokio::time::timeout(Duration::from_secs(2), feed.next())
        .await
        .expect("no feed event in time")
}

async fn wait_for_polls(source: &ScriptedSource, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while source.polls() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("poller stalled");
}

#[tokio::test]
async fn first_poll_is_delivered_even_when_empty() {
    let source = ScriptedSource::new(Vec::new());
    let mut feed = spawn_polling(source.clone(), Duration::from_millis(20));

    assert_eq!(next_event(&mut feed).await, Some(FeedEvent::Snapshot(Vec::new())));
}

#[tokio::test]
async fn unchanged_collection_is_not_redelivered() {
    let source = ScriptedSource::new(vec![raw("a", "Buy milk")]);
    let mut feed = spawn_polling(source.clone(), Duration::from_millis(20));

    let Some(FeedEvent::Snapshot(tasks)) = next_event(&mut feed).await else {
        panic!("expected a snapshot");
    };
    assert_eq!(tasks.len(), 1);

    let polled = source.polls();
    wait_for_polls(&source, polled + 3).await;
    assert!(
        tokio::time::timeout(Duration::from_millis(30), feed.next())
            .await
            .is_err(),
        "identical snapshot was delivered again"
    );

    source.serve(Ok(vec![raw("b", "Call bank"), raw("a", "Buy milk")]));
    let Some(FeedEvent::Snapshot(tasks)) = next_event(&mut feed).await else {
        panic!("expected a snapshot");
    };
    let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Call bank", "Buy milk"]);
}

#[tokio::test]
async fn failure_is_reported_once_and_recovery_redelivers() {
    let docs = vec![raw("a", "Buy milk")];
    let source = ScriptedSource::new(docs.clone());
    let mut feed = spawn_polling(source.clone(), Duration::from_millis(20));
    assert!(matches!(next_event(&mut feed).await, Some(FeedEvent::Snapshot(_))));

    source.serve(Err("unavailable".to_string()));
    let Some(FeedEvent::Error(message)) = next_event(&mut feed).await else {
        panic!("expected an error");
    };
    assert!(message.contains("unavailable"));

    let polled = source.polls();
    wait_for_polls(&source, polled + 3).await;

    // Same data as before the outage still comes through, clearing the error.
    source.serve(Ok(docs));
    assert!(matches!(next_event(&mut feed).await, Some(FeedEvent::Snapshot(t)) if t.len() == 1));
}

#[tokio::test]
async fn closing_stops_the_poller() {
    let source = ScriptedSource::new(Vec::new());
    let mut feed = spawn_polling(source.clone(), Duration::from_millis(10));
    next_event(&mut feed).await;

    feed.close();
    assert!(feed.next().await.is_none());

    tokio::time::sleep(Duration::from_millis(30)).await;
    let stopped_at = source.polls();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(source.polls(), stopped_at);
}
