//! End-to-end tests of the chat durability pipeline:
//! producer → stream engine → consumer group → worker → message store.

use rivulet::{
    ChatEvent, DurabilityMode, Error, MemoryStore, MessageRecord, MessageRole, MessageStore,
    MessageWorker, Producer, StreamEngine, UserId, WorkerConfig, MESSAGE_CONSUMER, MESSAGE_GROUP,
    MESSAGE_STREAM,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_retry_backoff(Duration::from_millis(20))
        .with_read_timeout(Duration::from_millis(20))
}

fn open_engine(dir: &TempDir) -> Arc<StreamEngine> {
    Arc::new(StreamEngine::open(dir.path(), DurabilityMode::Strict).unwrap())
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn all_appended_events_are_persisted_in_order() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let store = Arc::new(MemoryStore::new());

    let mut handle = MessageWorker::new(
        Arc::clone(&engine),
        Arc::clone(&store) as Arc<dyn MessageStore>,
        fast_config(),
    )
    .spawn();

    let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
    let n = 25;
    for i in 0..n {
        producer
            .enqueue(&ChatEvent::new(user("u1"), format!("msg-{}", i), MessageRole::User))
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(10), || store.len() == n));
    handle.stop();

    let contents: Vec<String> = store.all().into_iter().map(|r| r.content).collect();
    let expected: Vec<String> = (0..n).map(|i| format!("msg-{}", i)).collect();
    assert_eq!(contents, expected);
    assert_eq!(handle.stats().persisted, n as u64);
}

#[test]
fn single_event_persists_with_server_timestamp() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let store = Arc::new(MemoryStore::new());

    let mut handle = MessageWorker::new(
        Arc::clone(&engine),
        Arc::clone(&store) as Arc<dyn MessageStore>,
        fast_config(),
    )
    .spawn();

    let appended_at = chrono::Utc::now();
    let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
    producer
        .enqueue(&ChatEvent::new(user("u1"), "hello", MessageRole::User))
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || store.len() == 1));
    handle.stop();

    let records = store.messages_for_user(&user("u1")).unwrap();
    assert_eq!(records.len(), 1);
    let record: &MessageRecord = &records[0];
    assert_eq!(record.user_id, user("u1"));
    assert_eq!(record.content, "hello");
    assert_eq!(record.role, MessageRole::User);
    assert!(record.created_at >= appended_at);
}

#[test]
fn back_to_back_entries_persist_in_exact_order() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let store = Arc::new(MemoryStore::new());

    let mut handle = MessageWorker::new(
        Arc::clone(&engine),
        Arc::clone(&store) as Arc<dyn MessageStore>,
        fast_config(),
    )
    .spawn();

    let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
    producer
        .enqueue(&ChatEvent::new(user("u1"), "hi", MessageRole::User))
        .unwrap();
    producer
        .enqueue(&ChatEvent::new(user("u1"), "bye", MessageRole::User))
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || store.len() == 2));
    handle.stop();

    let contents: Vec<String> = store.all().into_iter().map(|r| r.content).collect();
    assert_eq!(contents, vec!["hi".to_string(), "bye".to_string()]);
}

#[test]
fn ensure_group_twice_keeps_cursor() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    engine.ensure_group(MESSAGE_STREAM, MESSAGE_GROUP).unwrap();

    let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
    producer
        .enqueue(&ChatEvent::new(user("u1"), "first", MessageRole::User))
        .unwrap();
    producer
        .enqueue(&ChatEvent::new(user("u1"), "second", MessageRole::User))
        .unwrap();

    let soon = || Some(Instant::now() + Duration::from_millis(200));
    let first = engine
        .read_group(MESSAGE_STREAM, MESSAGE_GROUP, MESSAGE_CONSUMER, soon())
        .unwrap()
        .unwrap();
    assert_eq!(first.field("content"), Some("first"));

    // Second ensure_group must neither fail nor rewind delivery
    engine.ensure_group(MESSAGE_STREAM, MESSAGE_GROUP).unwrap();
    let second = engine
        .read_group(MESSAGE_STREAM, MESSAGE_GROUP, MESSAGE_CONSUMER, soon())
        .unwrap()
        .unwrap();
    assert_eq!(second.field("content"), Some("second"));
}

#[test]
fn decode_failure_skips_entry_but_not_stream() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let store = Arc::new(MemoryStore::new());

    let mut handle = MessageWorker::new(
        Arc::clone(&engine),
        Arc::clone(&store) as Arc<dyn MessageStore>,
        fast_config(),
    )
    .spawn();

    // A raw malformed entry between two good ones
    let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
    producer
        .enqueue(&ChatEvent::new(user("u1"), "before", MessageRole::User))
        .unwrap();
    engine
        .append(
            MESSAGE_STREAM,
            vec![("garbage".to_string(), "only".to_string())],
        )
        .unwrap();
    producer
        .enqueue(&ChatEvent::new(user("u1"), "after", MessageRole::Assistant))
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || store.len() == 2));
    handle.stop();

    let contents: Vec<String> = store.all().into_iter().map(|r| r.content).collect();
    assert_eq!(contents, vec!["before".to_string(), "after".to_string()]);
    assert_eq!(handle.stats().decode_failures, 1);
}

#[test]
fn transient_persist_failure_loses_and_duplicates_nothing() {
    init_tracing();

    // Store that rejects the first insert of each content string once
    struct Flaky {
        inner: MemoryStore,
        failures_left: AtomicU64,
    }
    impl MessageStore for Flaky {
        fn insert(&self, event: &ChatEvent) -> rivulet::Result<MessageRecord> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::Store("injected failure".to_string()));
            }
            self.inner.insert(event)
        }
        fn messages_for_user(&self, user_id: &UserId) -> rivulet::Result<Vec<MessageRecord>> {
            self.inner.messages_for_user(user_id)
        }
        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let store = Arc::new(Flaky {
        inner: MemoryStore::new(),
        failures_left: AtomicU64::new(2),
    });

    let mut handle = MessageWorker::new(
        Arc::clone(&engine),
        Arc::clone(&store) as Arc<dyn MessageStore>,
        fast_config(),
    )
    .spawn();

    let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
    producer
        .enqueue(&ChatEvent::new(user("u1"), "a", MessageRole::User))
        .unwrap();
    producer
        .enqueue(&ChatEvent::new(user("u1"), "b", MessageRole::User))
        .unwrap();

    assert!(wait_until(Duration::from_secs(10), || store.len() == 2));
    handle.stop();

    // Same entries, same order, exactly once each despite the retries
    let contents: Vec<String> = store.inner.all().into_iter().map(|r| r.content).collect();
    assert_eq!(contents, vec!["a".to_string(), "b".to_string()]);
    assert!(engine.pending(MESSAGE_STREAM, MESSAGE_GROUP).unwrap().is_empty());
}

#[test]
fn worker_restart_does_not_lose_unconsumed_entries() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    // First incarnation: append two entries, persist only the first, then
    // "crash" (engine dropped without ack of the second)
    {
        let engine = open_engine(&dir);
        engine.ensure_group(MESSAGE_STREAM, MESSAGE_GROUP).unwrap();
        let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
        producer
            .enqueue(&ChatEvent::new(user("u1"), "persisted", MessageRole::User))
            .unwrap();
        producer
            .enqueue(&ChatEvent::new(user("u1"), "in-flight", MessageRole::User))
            .unwrap();

        let soon = Some(Instant::now() + Duration::from_millis(200));
        let first = engine
            .read_group(MESSAGE_STREAM, MESSAGE_GROUP, MESSAGE_CONSUMER, soon)
            .unwrap()
            .unwrap();
        engine.ack(MESSAGE_STREAM, MESSAGE_GROUP, first.id).unwrap();

        // Second entry delivered but never persisted or acked
        let soon = Some(Instant::now() + Duration::from_millis(200));
        engine
            .read_group(MESSAGE_STREAM, MESSAGE_GROUP, MESSAGE_CONSUMER, soon)
            .unwrap()
            .unwrap();
    }

    // Second incarnation: the worker claims the unacked delivery on start
    let engine = open_engine(&dir);
    let store = Arc::new(MemoryStore::new());
    let mut handle = MessageWorker::new(
        Arc::clone(&engine),
        Arc::clone(&store) as Arc<dyn MessageStore>,
        fast_config(),
    )
    .spawn();

    assert!(wait_until(Duration::from_secs(5), || store.len() == 1));
    handle.stop();

    let records = store.messages_for_user(&user("u1")).unwrap();
    assert_eq!(records[0].content, "in-flight");
    assert!(engine.pending(MESSAGE_STREAM, MESSAGE_GROUP).unwrap().is_empty());
}

#[test]
fn consumption_can_start_before_any_append() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let store = Arc::new(MemoryStore::new());

    // Worker boots first; the group (and stream) are created by it
    let mut handle = MessageWorker::new(
        Arc::clone(&engine),
        Arc::clone(&store) as Arc<dyn MessageStore>,
        fast_config(),
    )
    .spawn();

    assert!(wait_until(Duration::from_secs(5), || {
        engine.ensure_group(MESSAGE_STREAM, MESSAGE_GROUP).is_ok()
    }));

    let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
    producer
        .enqueue(&ChatEvent::new(user("u1"), "first ever", MessageRole::User))
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || store.len() == 1));
    handle.stop();
}

#[test]
fn shutdown_unblocks_worker_promptly() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = open_engine(&dir);
    let store = Arc::new(MemoryStore::new());

    let mut handle = MessageWorker::new(
        Arc::clone(&engine),
        store as Arc<dyn MessageStore>,
        // Long read slice so the exit is driven by shutdown, not timeout
        fast_config().with_read_timeout(Duration::from_secs(30)),
    )
    .spawn();

    std::thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    engine.shutdown();
    handle.stop();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn durable_pipeline_survives_full_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("messages.jsonl");

    {
        let engine = open_engine(&dir);
        let store = Arc::new(rivulet::JsonLinesStore::open(&store_path).unwrap());
        let mut handle = MessageWorker::new(
            Arc::clone(&engine),
            Arc::clone(&store) as Arc<dyn MessageStore>,
            fast_config(),
        )
        .spawn();

        let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
        producer
            .enqueue(&ChatEvent::new(user("u1"), "round one", MessageRole::User))
            .unwrap();
        assert!(wait_until(Duration::from_secs(5), || store.len() == 1));
        handle.stop();
        engine.shutdown();
    }

    // Everything reopens from disk; nothing is redelivered, nothing is lost
    let engine = open_engine(&dir);
    let store = Arc::new(rivulet::JsonLinesStore::open(&store_path).unwrap());
    assert_eq!(store.len(), 1);

    let mut handle = MessageWorker::new(
        Arc::clone(&engine),
        Arc::clone(&store) as Arc<dyn MessageStore>,
        fast_config(),
    )
    .spawn();

    let producer = Producer::new(Arc::clone(&engine), MESSAGE_STREAM);
    producer
        .enqueue(&ChatEvent::new(user("u1"), "round two", MessageRole::Assistant))
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || store.len() == 2));
    handle.stop();

    let records = store.messages_for_user(&user("u1")).unwrap();
    let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["round two", "round one"]);
}
