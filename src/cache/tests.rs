#![cfg(test)]

use super::*;
use crate::query::SelectionBuilder;
use crate::storage::{CounterMetrics, Record, StoreValue};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn author_query() -> SelectionSet {
    SelectionBuilder::new()
        .object("author", |s| s.field("id").field("name"))
        .build()
}

fn author(name: &str) -> Value {
    json!({"author": {"__typename": "Author", "id": 1, "name": name}})
}

fn vars() -> Variables {
    Variables::new()
}

fn counting_watch(cache: &InMemoryCache) -> (Arc<AtomicUsize>, Subscription) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let sub = cache.watch(WatchOptions::new(author_query(), move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));
    (calls, sub)
}

fn author_name(diff: &Diff) -> Option<String> {
    diff.result
        .pointer("/author/name")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn rename_layer(
    name: &'static str,
) -> impl Fn(&mut CacheTransaction<'_>) -> Result<()> + Send + Sync + 'static {
    move |tx: &mut CacheTransaction<'_>| {
        tx.write(&author(name), &author_query(), &Variables::new())?;
        Ok(())
    }
}

#[test]
fn write_then_read_round_trips() {
    let cache = InMemoryCache::new();
    let report = cache.write(&author("Ada"), &author_query(), &vars()).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.records, 2);
    let diff = cache.read(&author_query(), &vars(), false).unwrap();
    assert!(diff.complete);
    assert_eq!(*diff.result, author("Ada"));
}

#[test]
fn failed_write_leaves_store_untouched_and_silent() {
    let cache = InMemoryCache::new();
    let (calls, _sub) = counting_watch(&cache);
    let err = cache.write(&json!({"author": 3}), &author_query(), &vars());
    assert!(matches!(err, Err(CacheError::InvalidQuery(_))));
    assert!(cache.extract(false).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn every_mutation_broadcasts_exactly_once() {
    let cache = InMemoryCache::new();
    let (calls, _sub) = counting_watch(&cache);
    let count = || calls.load(Ordering::SeqCst);

    cache.write(&author("a"), &author_query(), &vars()).unwrap();
    assert_eq!(count(), 1);
    let fragment = SelectionBuilder::new().field("name").build();
    cache
        .write_fragment("Author:1", &json!({"name": "b"}), &fragment, &vars())
        .unwrap();
    assert_eq!(count(), 2);
    cache.add_optimistic("opt", rename_layer("c")).unwrap();
    assert_eq!(count(), 3);
    cache.remove_optimistic("opt").unwrap();
    assert_eq!(count(), 4);
    cache.reset();
    assert_eq!(count(), 5);
    cache.restore(NormalizedSnapshot::new());
    assert_eq!(count(), 6);
    cache
        .transact(|tx| {
            tx.write(&author("d"), &author_query(), &Variables::new())?;
            tx.write(&author("e"), &author_query(), &Variables::new())?;
            Ok(())
        })
        .unwrap();
    assert_eq!(count(), 7);
    assert_eq!(cache.broadcast_watches(), 1);
    assert_eq!(count(), 8);
}

#[test]
fn callbacks_may_call_back_into_the_cache() {
    let cache = InMemoryCache::new();
    let names = Arc::new(Mutex::new(Vec::new()));
    let reentrant = cache.clone();
    let sink = Arc::clone(&names);
    let _sub = cache.watch(WatchOptions::new(author_query(), move |_| {
        let diff = reentrant.read(&author_query(), &Variables::new(), true).unwrap();
        sink.lock().push(author_name(&diff));
    }));
    cache.write(&author("Ada"), &author_query(), &vars()).unwrap();
    assert_eq!(*names.lock(), vec![Some("Ada".to_owned())]);
}

#[test]
fn writes_from_a_callback_are_delivered_after_it_returns() {
    let cache = InMemoryCache::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let reentrant = cache.clone();
    let sink = Arc::clone(&events);
    let _sub = cache.watch(WatchOptions::new(author_query(), move |diff| {
        let name = author_name(diff).unwrap_or_default();
        sink.lock().push(format!("start {name}"));
        if name == "Ada" {
            reentrant.write(&author("Grace"), &author_query(), &vars()).unwrap();
        }
        sink.lock().push(format!("end {name}"));
    }));
    cache.write(&author("Ada"), &author_query(), &vars()).unwrap();
    assert_eq!(
        *events.lock(),
        vec!["start Ada", "end Ada", "start Grace", "end Grace"]
    );
}

#[test]
fn optimistic_writes_are_invisible_to_confirmed_reads() {
    let cache = InMemoryCache::new();
    cache.write(&author("base"), &author_query(), &vars()).unwrap();
    cache.add_optimistic("opt", rename_layer("guess")).unwrap();

    let optimistic = cache.read(&author_query(), &vars(), true).unwrap();
    let confirmed = cache.read(&author_query(), &vars(), false).unwrap();
    assert_eq!(author_name(&optimistic).as_deref(), Some("guess"));
    assert_eq!(author_name(&confirmed).as_deref(), Some("base"));
    assert_eq!(
        cache.extract(false).get("Author:1").and_then(|r| r.get("name").cloned()),
        Some(StoreValue::Scalar(json!("base")))
    );
}

#[test]
fn removing_a_layer_replays_later_layers() {
    let cache = InMemoryCache::new();
    cache.write(&author("base"), &author_query(), &vars()).unwrap();
    cache.add_optimistic("first", rename_layer("first")).unwrap();
    cache
        .add_optimistic("suffix", |tx| {
            let current = tx.read(&author_query(), &Variables::new())?;
            let name = author_name(&current).unwrap_or_default();
            tx.write(&author(&format!("{name}!")), &author_query(), &Variables::new())?;
            Ok(())
        })
        .unwrap();
    let diff = cache.read(&author_query(), &vars(), true).unwrap();
    assert_eq!(author_name(&diff).as_deref(), Some("first!"));

    cache.remove_optimistic("first").unwrap();
    let diff = cache.read(&author_query(), &vars(), true).unwrap();
    assert_eq!(author_name(&diff).as_deref(), Some("base!"));
    assert_eq!(cache.optimistic_layers(), vec!["suffix".to_owned()]);
}

#[test]
fn failing_optimistic_transaction_adds_no_layer() {
    let cache = InMemoryCache::new();
    let (calls, _sub) = counting_watch(&cache);
    let err = cache.add_optimistic("bad", |_tx| Err(CacheError::Transaction("nope".into())));
    assert!(matches!(err, Err(CacheError::Transaction(_))));
    assert!(cache.optimistic_layers().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn failing_transact_commits_nothing() {
    let cache = InMemoryCache::new();
    let err = cache.transact(|tx| {
        tx.write(&author("half"), &author_query(), &Variables::new())?;
        Err(CacheError::Transaction("abort".into()))
    });
    assert!(err.is_err());
    assert!(cache.extract(false).is_empty());
}

#[test]
fn transactions_read_their_own_writes() {
    let cache = InMemoryCache::new();
    cache
        .transact(|tx| {
            tx.write(&author("staged"), &author_query(), &Variables::new())?;
            let diff = tx.read(&author_query(), &Variables::new())?;
            assert_eq!(author_name(&diff).as_deref(), Some("staged"));
            let fragment = SelectionBuilder::new().field("name").build();
            assert!(tx
                .read_fragment("Author:1", &fragment, &Variables::new())?
                .is_some());
            Ok(())
        })
        .unwrap();
}

#[test]
fn reset_clears_confirmed_data_but_keeps_layers() {
    let cache = InMemoryCache::new();
    cache.write(&author("base"), &author_query(), &vars()).unwrap();
    cache.add_optimistic("opt", rename_layer("guess")).unwrap();
    cache.reset();
    assert!(cache.extract(false).is_empty());
    assert_eq!(cache.optimistic_layers(), vec!["opt".to_owned()]);
    let diff = cache.read(&author_query(), &vars(), true).unwrap();
    assert_eq!(author_name(&diff).as_deref(), Some("guess"));
}

#[test]
fn extract_optimistic_folds_layers() {
    let cache = InMemoryCache::new();
    cache.write(&author("base"), &author_query(), &vars()).unwrap();
    cache.add_optimistic("opt", rename_layer("guess")).unwrap();
    let snapshot = cache.extract(true);
    assert_eq!(snapshot.len(), 2);
    assert_eq!(
        snapshot.get("Author:1").and_then(|r| r.get("name").cloned()),
        Some(StoreValue::Scalar(json!("guess")))
    );
}

#[test]
fn restore_replaces_the_confirmed_store() {
    let source = InMemoryCache::new();
    source.write(&author("Ada"), &author_query(), &vars()).unwrap();
    let snapshot = source.extract(false);

    let target = InMemoryCache::new();
    let mut stale = Record::with_typename("Author");
    stale.insert("name", StoreValue::Scalar(json!("stale")));
    target.restore([("Author:9".to_owned(), stale)].into_iter().collect());
    target.restore(snapshot.clone());
    assert_eq!(target.extract(false), snapshot);
}

#[test]
fn read_fragment_distinguishes_absent_identity() {
    let cache = InMemoryCache::new();
    cache.write(&author("Ada"), &author_query(), &vars()).unwrap();
    let fragment = SelectionBuilder::new().field("name").build();
    assert!(cache
        .read_fragment("Author:2", &fragment, &vars(), false)
        .unwrap()
        .is_none());
    let diff = cache
        .read_fragment("Author:1", &fragment, &vars(), false)
        .unwrap()
        .unwrap();
    assert_eq!(*diff.result, json!({"name": "Ada"}));
}

#[test]
fn read_query_is_strict_about_missing_fields() {
    let cache = InMemoryCache::new();
    cache.write(&author("Ada"), &author_query(), &vars()).unwrap();
    let wider = SelectionBuilder::new()
        .object("author", |s| s.field("id").field("name").field("age"))
        .build();
    match cache.read_query(&wider, &vars(), false) {
        Err(CacheError::MissingFields(paths)) => assert_eq!(paths, vec!["author.age"]),
        other => panic!("expected missing fields, got {other:?}"),
    }
    assert_eq!(cache.read_query(&author_query(), &vars(), false).unwrap(), author("Ada"));
}

#[test]
fn unchanged_watch_results_keep_their_allocation() {
    let cache = InMemoryCache::new();
    let diffs = Arc::new(Mutex::new(Vec::<Diff>::new()));
    let sink = Arc::clone(&diffs);
    let _sub = cache.watch(WatchOptions::new(author_query(), move |diff| {
        sink.lock().push(diff.clone());
    }));
    cache.write(&author("Ada"), &author_query(), &vars()).unwrap();
    let unrelated = SelectionBuilder::new().field("count").build();
    cache.write(&json!({"count": 1}), &unrelated, &vars()).unwrap();

    let diffs = diffs.lock();
    assert_eq!(diffs.len(), 2);
    assert!(diffs[1].is_same_result(&diffs[0].result));
}

#[test]
fn unsubscribe_removes_only_that_watch() {
    let cache = InMemoryCache::new();
    let (first, first_sub) = counting_watch(&cache);
    let (second, _second_sub) = counting_watch(&cache);
    assert!(first_sub.unsubscribe());
    cache.write(&author("Ada"), &author_query(), &vars()).unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(cache.watch_count(), 1);
}

#[test]
fn failing_watch_diff_is_skipped() {
    let cache = InMemoryCache::new();
    let (healthy, _sub) = counting_watch(&cache);
    // `author` holds a reference, so reading it as a leaf is invalid.
    let broken = SelectionBuilder::new().field("author").build();
    let failures = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&failures);
    let _broken = cache.watch(WatchOptions::new(broken, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));
    cache.write(&author("Ada"), &author_query(), &vars()).unwrap();
    assert_eq!(healthy.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
}

#[test]
fn metrics_observe_writes_and_broadcasts() {
    let metrics = Arc::new(CounterMetrics::default());
    let cache = InMemoryCache::with_options(CacheOptions::new().metrics(metrics.clone()));
    let (_calls, _sub) = counting_watch(&cache);
    cache.write(&author("Ada"), &author_query(), &vars()).unwrap();
    cache.add_optimistic("opt", rename_layer("guess")).unwrap();
    assert_eq!(metrics.writes.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.records_written.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.layers_applied.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.broadcasts.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.notifications.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.complete_diffs.load(Ordering::Relaxed), 2);
}

#[test]
fn watches_can_read_the_confirmed_view_only() {
    let cache = InMemoryCache::new();
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    let _sub = cache.watch(
        WatchOptions::new(author_query(), move |diff| sink.lock().push(author_name(diff)))
            .optimistic(false),
    );
    cache.write(&author("base"), &author_query(), &vars()).unwrap();
    cache.add_optimistic("opt", rename_layer("guess")).unwrap();
    assert_eq!(
        *names.lock(),
        vec![Some("base".to_owned()), Some("base".to_owned())]
    );
}
