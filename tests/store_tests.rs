// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

use sketch_state_store::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const STORE: &str = "word-counts";

/// 11 words, 6 distinct.
const WORDS: [&str; 11] = [
    "hello", "kafka", "streams", "kafka", "streams", "count", "kafka", "counts", "words", "hello",
    "words",
];

fn config() -> StoreConfig {
    StoreConfig::new(4, 1000)
}

/// Wraps an [`InMemoryLog`], counting full reads and delaying each one.
struct SlowLog {
    inner: InMemoryLog,
    read_delay: Duration,
    reads: Arc<AtomicUsize>,
}

impl ReplayLog for SlowLog {
    fn append(&mut self, entry: &LogEntry) -> Result<(), StoreError> {
        self.inner.append(entry)
    }

    fn read_all(&mut self) -> Result<Vec<LogEntry>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.read_delay);
        self.inner.read_all()
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.inner.flush()
    }

    fn is_empty(&mut self) -> Result<bool, StoreError> {
        self.inner.is_empty()
    }
}

fn slow_log(entries: usize, read_delay: Duration) -> (SlowLog, Arc<AtomicUsize>) {
    let reads = Arc::new(AtomicUsize::new(0));
    let log = SlowLog {
        inner: InMemoryLog::with_entries((0..entries).map(|i| LogEntry::new("kafka", i as i64)).collect()),
        read_delay,
        reads: Arc::clone(&reads),
    };
    (log, reads)
}

fn serving_store(log: InMemoryLog) -> CountMinStore<InMemoryLog> {
    let store = CountMinStore::open(STORE, &config(), log).unwrap();
    assert_eq!(store.state(), StoreState::Serving);
    store
}

#[test]
fn test_put_get_scenario() {
    let mut store = serving_store(InMemoryLog::new());
    for ts in 0..3 {
        store.put("kafka", ts).unwrap();
    }
    store.put("hello", 3).unwrap();
    store.put("streams", 4).unwrap();
    assert_eq!(store.put("streams", 5).unwrap(), 2);

    assert_eq!(store.get("kafka").unwrap(), 3);
    assert_eq!(store.get("hello").unwrap(), 1);
    assert_eq!(store.get("streams").unwrap(), 2);
    assert_eq!(store.get("absent").unwrap(), 0);
    assert_eq!(store.total_count(), 6);
}

#[test]
fn test_restart_restores_identical_estimates() {
    let log = InMemoryLog::new();
    let mut store = serving_store(log.clone());
    for (ts, word) in WORDS.iter().enumerate() {
        store.put(word, ts as i64).unwrap();
    }
    let before: Vec<u64> = WORDS.iter().map(|w| store.get(w).unwrap()).collect();
    let sketch_before = store.sketch().clone();
    store.close().unwrap();

    let mut reopened = CountMinStore::open(STORE, &config(), log).unwrap();
    assert_eq!(reopened.state(), StoreState::Restoring);
    assert_eq!(reopened.restore_from_log(None).unwrap(), 11);
    assert_eq!(reopened.state(), StoreState::Serving);

    let after: Vec<u64> = WORDS.iter().map(|w| reopened.get(w).unwrap()).collect();
    assert_eq!(after, before);
    assert_eq!(reopened.sketch(), &sketch_before);
    assert_eq!(reopened.total_count(), 11);
    assert_eq!(reopened.get("kafka").unwrap(), 3);
    assert_eq!(reopened.get("counts").unwrap(), 1);
}

#[test]
fn test_restore_from_supplied_entries() {
    let entries: Vec<LogEntry> = WORDS
        .iter()
        .enumerate()
        .map(|(ts, w)| LogEntry::new(*w, ts as i64))
        .collect();
    let log = InMemoryLog::with_entries(entries.clone());

    let mut store = CountMinStore::open(STORE, &config(), log).unwrap();
    assert_eq!(store.restore(entries).unwrap(), 11);
    assert_eq!(store.get("words").unwrap(), 2);
}

#[test]
fn test_live_traffic_rejected_while_restoring() {
    let log = InMemoryLog::with_entries(vec![LogEntry::new("kafka", 0)]);
    let mut store = CountMinStore::open(STORE, &config(), log).unwrap();

    assert!(matches!(store.put("kafka", 1), Err(StoreError::RestoreIncomplete(_))));
    assert!(matches!(store.get("kafka"), Err(StoreError::RestoreIncomplete(_))));
    store.flush().unwrap();
}

#[test]
fn test_restore_is_only_allowed_once() {
    let log = InMemoryLog::with_entries(vec![LogEntry::new("kafka", 0)]);
    let mut store = CountMinStore::open(STORE, &config(), log).unwrap();
    store.restore_from_log(None).unwrap();

    assert!(matches!(
        store.restore_from_log(None),
        Err(StoreError::IllegalStoreState(_))
    ));
    assert_eq!(store.get("kafka").unwrap(), 1);
}

#[test]
fn test_restore_after_serving_rejected() {
    let mut store = serving_store(InMemoryLog::new());
    store.put("kafka", 0).unwrap();

    let err = store.restore(vec![LogEntry::new("kafka", 0)]).unwrap_err();
    assert!(matches!(err, StoreError::IllegalStoreState(_)));
    assert_eq!(store.get("kafka").unwrap(), 1);
}

#[test]
fn test_restore_timeout_is_retryable() {
    let entries: Vec<LogEntry> = (0..1000).map(|i| LogEntry::new("kafka", i)).collect();
    let log = InMemoryLog::with_entries(entries.clone());
    let mut store = CountMinStore::open(STORE, &config(), log).unwrap();

    let err = store
        .restore_with_timeout(entries.clone(), Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, StoreError::RestoreIncomplete(_)));
    assert!(err.is_retryable());
    assert_eq!(store.state(), StoreState::Restoring);
    assert_eq!(store.total_count(), 0);
    assert!(store.sketch().is_empty());

    assert_eq!(
        store
            .restore_with_timeout(entries, Duration::from_secs(60))
            .unwrap(),
        1000
    );
    assert_eq!(store.get("kafka").unwrap(), 1000);
}

#[test]
fn test_init_does_not_read_the_whole_log() {
    let (log, reads) = slow_log(3, Duration::ZERO);
    let mut store = CountMinStore::open(STORE, &config(), log).unwrap();
    assert_eq!(store.state(), StoreState::Restoring);
    assert_eq!(reads.load(Ordering::SeqCst), 0);

    assert_eq!(store.restore_from_log(None).unwrap(), 3);
    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert_eq!(store.get("kafka").unwrap(), 3);
}

#[test]
fn test_restore_timeout_covers_log_read() {
    let (log, reads) = slow_log(1, Duration::from_millis(50));
    let mut store = CountMinStore::open(STORE, &config(), log).unwrap();

    let err = store
        .restore_from_log(Some(Duration::from_millis(10)))
        .unwrap_err();
    assert!(matches!(err, StoreError::RestoreIncomplete(_)));
    assert_eq!(store.state(), StoreState::Restoring);
    assert!(store.sketch().is_empty());

    assert_eq!(store.restore_from_log(Some(Duration::from_secs(60))).unwrap(), 1);
    assert_eq!(reads.load(Ordering::SeqCst), 2);
    assert_eq!(store.get("kafka").unwrap(), 1);
}

#[test]
fn test_closed_store_rejects_operations() {
    let mut store = serving_store(InMemoryLog::new());
    store.put("kafka", 0).unwrap();
    store.close().unwrap();
    assert_eq!(store.state(), StoreState::Closed);

    assert!(matches!(store.put("kafka", 1), Err(StoreError::StoreClosed(_))));
    assert!(matches!(store.get("kafka"), Err(StoreError::StoreClosed(_))));
    assert!(matches!(store.flush(), Err(StoreError::StoreClosed(_))));
    assert!(matches!(store.restore(vec![]), Err(StoreError::StoreClosed(_))));
    assert!(matches!(store.init(), Err(StoreError::StoreClosed(_))));

    store.close().unwrap();
    assert_eq!(store.state(), StoreState::Closed);
}

#[test]
fn test_use_before_init_rejected() {
    let mut store = CountMinStore::new(STORE, &config(), InMemoryLog::new()).unwrap();
    assert_eq!(store.state(), StoreState::Created);

    assert!(matches!(store.put("kafka", 0), Err(StoreError::IllegalStoreState(_))));
    assert!(matches!(store.get("kafka"), Err(StoreError::IllegalStoreState(_))));
    assert!(matches!(store.flush(), Err(StoreError::IllegalStoreState(_))));
    assert!(matches!(store.restore(vec![]), Err(StoreError::IllegalStoreState(_))));

    assert_eq!(store.init().unwrap(), StoreState::Serving);
    assert!(matches!(store.init(), Err(StoreError::IllegalStoreState(_))));
}

#[test]
fn test_invalid_construction() {
    assert!(matches!(
        CountMinStore::new(STORE, &StoreConfig::new(4, 0), InMemoryLog::new()),
        Err(StoreError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        CountMinStore::new("", &config(), InMemoryLog::new()),
        Err(StoreError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        CountMinStore::new("a/b", &config(), InMemoryLog::new()),
        Err(StoreError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_sync_mode_flushes_every_put() {
    let log = InMemoryLog::new();
    let mut store = serving_store(log.clone());
    for word in ["kafka", "hello", "kafka"] {
        store.put(word, 0).unwrap();
    }

    assert_eq!(log.durable_len(), 3);
    assert_eq!(log.pending_len(), 0);

    log.crash();
    let mut reopened = CountMinStore::open(STORE, &config(), log).unwrap();
    reopened.restore_from_log(None).unwrap();
    assert_eq!(reopened.get("kafka").unwrap(), 2);
}

#[test]
fn test_async_mode_loses_unflushed_entries_on_crash() {
    let log = InMemoryLog::new();
    let async_config = config()
        .durability(DurabilityMode::AsyncWithPeriodicFlush)
        .flush_interval(0);
    let mut store = CountMinStore::open(STORE, &async_config, log.clone()).unwrap();
    store.put("kafka", 0).unwrap();
    store.flush().unwrap();
    store.put("kafka", 1).unwrap();
    store.put("kafka", 2).unwrap();

    assert_eq!(store.get("kafka").unwrap(), 3);
    assert_eq!(log.durable_len(), 1);
    assert_eq!(log.pending_len(), 2);

    log.crash();
    let mut reopened = CountMinStore::open(STORE, &async_config, log).unwrap();
    reopened.restore_from_log(None).unwrap();
    assert_eq!(reopened.get("kafka").unwrap(), 1);
}

#[test]
fn test_async_mode_periodic_flush() {
    let log = InMemoryLog::new();
    let async_config = config()
        .durability(DurabilityMode::AsyncWithPeriodicFlush)
        .flush_interval(2);
    let mut store = CountMinStore::open(STORE, &async_config, log.clone()).unwrap();
    for ts in 0..5 {
        store.put("kafka", ts).unwrap();
    }

    assert_eq!(log.durable_len(), 4);
    assert_eq!(log.pending_len(), 1);
    assert_eq!(log.flush_count(), 2);

    store.close().unwrap();
    assert_eq!(log.durable_len(), 5);
}

#[test]
fn test_flush_is_idempotent() {
    let log = InMemoryLog::new();
    let mut store = serving_store(log.clone());
    for (ts, word) in WORDS.iter().enumerate() {
        store.put(word, ts as i64).unwrap();
    }

    let snapshot = store.snapshot().unwrap();
    let durable = log.entries();
    for _ in 0..3 {
        store.flush().unwrap();
    }

    assert_eq!(store.snapshot().unwrap(), snapshot);
    assert_eq!(log.entries(), durable);
    assert_eq!(store.total_count(), 11);
}

#[test]
fn test_log_failure_leaves_sketch_untouched() {
    let log = InMemoryLog::new();
    let mut store = serving_store(log.clone());
    store.put("kafka", 0).unwrap();

    log.set_fail_appends(true);
    assert!(matches!(store.put("kafka", 1), Err(StoreError::Io(_))));
    assert_eq!(store.get("kafka").unwrap(), 1);
    assert_eq!(store.total_count(), 1);

    log.set_fail_appends(false);
    assert_eq!(store.put("kafka", 2).unwrap(), 2);
}

#[test]
fn test_error_bound_tracks_total() {
    let mut store = serving_store(InMemoryLog::new());
    for ts in 0..10 {
        store.put("kafka", ts).unwrap();
    }

    let expected = std::f64::consts::E / 1000.0 * 10.0;
    assert!((store.error_bound() - expected).abs() < 1e-9);
}

#[test]
fn test_shared_store_concurrent_puts() {
    let log = InMemoryLog::new();
    let shared = SharedStore::new(serving_store(log.clone()));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = shared.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    store.put("kafka", worker * 1000 + i).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(shared.get("kafka").unwrap(), 1000);
    assert_eq!(shared.total_count(), 1000);
    assert_eq!(log.durable_len(), 1000);

    shared.close().unwrap();
    assert_eq!(shared.state(), StoreState::Closed);
}

#[test]
fn test_shared_store_restore() {
    let log = InMemoryLog::with_entries(vec![LogEntry::new("kafka", 0), LogEntry::new("kafka", 1)]);
    let shared = SharedStore::new(CountMinStore::open(STORE, &config(), log).unwrap());
    assert_eq!(shared.state(), StoreState::Restoring);

    shared.restore_from_log(None).unwrap();
    assert_eq!(shared.get("kafka").unwrap(), 2);
    assert_eq!(shared.put("kafka", 2).unwrap(), 3);
}

#[test]
fn test_config_parsing() {
    let parsed = StoreConfig::from_json(
        r#"{"depth": 4, "width": 1000, "durability": "async", "flush_interval": 10}"#,
    )
    .unwrap();
    assert_eq!(parsed.durability, DurabilityMode::AsyncWithPeriodicFlush);
    assert_eq!(parsed.flush_interval, 10);
    assert_eq!(parsed.seed, StoreConfig::default().seed);

    assert!(matches!(
        StoreConfig::from_json(r#"{"width": 0}"#),
        Err(StoreError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        StoreConfig::from_json(r#"{"depth": 1024, "width": 1073741824}"#),
        Err(StoreError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        StoreConfig::with_error_bounds(1e-300, 0.5),
        Err(StoreError::InvalidConfiguration(_))
    ));
    assert_eq!(StoreConfig::from_json("{}").unwrap(), StoreConfig::default());

    let sized = StoreConfig::with_error_bounds(0.001, 0.01).unwrap();
    assert_eq!((sized.depth, sized.width), (5, 2719));
    assert_eq!(sized, StoreConfig::default());

    assert_eq!("SYNC".parse::<DurabilityMode>().unwrap(), DurabilityMode::Sync);
    assert_eq!(
        "async_with_periodic_flush".parse::<DurabilityMode>().unwrap(),
        DurabilityMode::AsyncWithPeriodicFlush
    );
    assert!("eventually".parse::<DurabilityMode>().is_err());
    assert_eq!(DurabilityMode::AsyncWithPeriodicFlush.to_string(), "async");
    assert_eq!(StoreState::Restoring.to_string(), "Restoring");
}
