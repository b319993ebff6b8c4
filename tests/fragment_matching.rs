use std::sync::Arc;

use serde_json::{json, Value};
use shade::query::{SelectionBuilder, SelectionSet, Variables};
use shade::{
    CacheError, CacheOptions, FragmentMatcher, InMemoryCache, IntrospectionFragmentMatcher,
};

fn schema() -> Value {
    json!({
        "__schema": {
            "types": [
                {
                    "kind": "UNION",
                    "name": "Item",
                    "possibleTypes": [{"name": "ItemA"}, {"name": "ItemB"}]
                },
                {"kind": "INTERFACE", "name": "Node", "possibleTypes": [{"name": "ItemA"}]},
                {"kind": "OBJECT", "name": "ItemA"},
                {"kind": "OBJECT", "name": "ItemB"}
            ]
        }
    })
}

fn items_query() -> SelectionSet {
    SelectionBuilder::new()
        .object("items", |s| {
            s.field("id")
                .on("ItemA", |s| s.field("a"))
                .on("ItemB", |s| s.field("b"))
                .on("Node", |s| s.field("nodeId"))
        })
        .build()
}

fn items() -> Value {
    json!({"items": [
        {"__typename": "ItemA", "id": 1, "a": "alpha", "nodeId": "n1"},
        {"__typename": "ItemB", "id": 2, "b": "beta"}
    ]})
}

fn introspection_cache() -> InMemoryCache {
    let matcher = IntrospectionFragmentMatcher::from_json(schema()).unwrap();
    InMemoryCache::with_options(CacheOptions::new().fragment_matcher(Arc::new(matcher)))
}

#[tokio::test]
async fn introspection_matching_reads_exact_shapes() {
    let cache = introspection_cache();
    cache.ready().await.unwrap();
    cache.write(&items(), &items_query(), &Variables::new()).unwrap();

    let diff = cache.read(&items_query(), &Variables::new(), false).unwrap();
    assert!(diff.complete, "missing: {:?}", diff.missing);
    assert_eq!(*diff.result, items());
}

#[test]
fn abstract_conditions_match_members() {
    let cache = introspection_cache();
    cache.write(&items(), &items_query(), &Variables::new()).unwrap();
    let by_union = SelectionBuilder::new()
        .object("items", |s| s.field("id").on("Item", |s| s.field("__typename")))
        .build();
    let diff = cache.read(&by_union, &Variables::new(), false).unwrap();
    assert!(diff.complete);
    assert_eq!(
        *diff.result,
        json!({"items": [
            {"__typename": "ItemA", "id": 1},
            {"__typename": "ItemB", "id": 2}
        ]})
    );

    let unrelated = SelectionBuilder::new()
        .object("items", |s| s.field("id").on("NotAnItem", |s| s.field("a")))
        .build();
    let diff = cache.read(&unrelated, &Variables::new(), false).unwrap();
    assert!(diff.complete);
    assert_eq!(diff.result["items"][0].get("a"), None);
}

#[test]
fn heuristic_matching_flags_guesses() {
    let cache = InMemoryCache::new();
    cache.write(&items(), &items_query(), &Variables::new()).unwrap();
    let by_union = SelectionBuilder::new()
        .object("items", |s| s.field("id").on("Item", |s| s.field("__typename")))
        .build();
    let diff = cache.read(&by_union, &Variables::new(), false).unwrap();
    assert!(!diff.complete);
    assert!(diff.missing.is_empty());
    assert_eq!(diff.result["items"][1]["__typename"], json!("ItemB"));
}

#[test]
fn missing_typename_is_a_type_resolution_error() {
    let matcher = IntrospectionFragmentMatcher::from_json(schema()).unwrap();
    let cache = InMemoryCache::with_options(
        CacheOptions::new()
            .fragment_matcher(Arc::new(matcher))
            .add_typename(false),
    );
    let plain = SelectionBuilder::new()
        .object("item", |s| s.field("a"))
        .build();
    cache
        .write(&json!({"item": {"a": "alpha"}}), &plain, &Variables::new())
        .unwrap();
    let before = cache.extract(false);

    let conditioned = SelectionBuilder::new()
        .object("item", |s| s.on("Item", |s| s.field("a")))
        .build();
    match cache.read(&conditioned, &Variables::new(), false) {
        Err(CacheError::TypeResolution { type_condition, .. }) => {
            assert_eq!(type_condition, "Item")
        }
        other => panic!("expected type resolution error, got {other:?}"),
    }
    assert_eq!(cache.extract(false), before);
}

#[tokio::test]
async fn unseeded_matcher_is_a_configuration_error() {
    let matcher = Arc::new(IntrospectionFragmentMatcher::new());
    let cache = InMemoryCache::with_options(CacheOptions::new().fragment_matcher(matcher.clone()));
    assert!(matches!(cache.ready().await, Err(CacheError::Configuration(_))));
    assert!(matches!(
        cache.write(&items(), &items_query(), &Variables::new()),
        Err(CacheError::Configuration(_))
    ));

    matcher.load(&serde_json::from_value(schema()).unwrap());
    assert!(matcher.is_ready());
    cache.ready().await.unwrap();
    cache.write(&items(), &items_query(), &Variables::new()).unwrap();
}

#[test]
fn root_fragments_on_query_read_complete() {
    let cache = InMemoryCache::new();
    let status = SelectionBuilder::new().field("status").build();
    cache
        .write(&json!({"status": "ok"}), &status, &Variables::new())
        .unwrap();
    let on_query = SelectionBuilder::new()
        .on("Query", |s| s.field("status"))
        .build();
    let diff = cache.read(&on_query, &Variables::new(), false).unwrap();
    assert!(diff.complete);
    assert_eq!(*diff.result, json!({"status": "ok"}));
}
