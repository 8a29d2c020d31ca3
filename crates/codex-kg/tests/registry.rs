//! Namespace lifecycle and snapshot persistence.

mod common;

use std::sync::Arc;

use codex_cache::{FileCache, MemoryCache, MetadataCache};
use codex_core::{Deadline, ErrorKind, Snapshot};
use codex_kg::CodexKg;

use common::{codex, companies, produces, products, DownCache, FakeGraph, SlowCache};

#[tokio::test]
async fn first_open_creates_keyspace_and_empty_snapshot() {
    let (codex, graph, cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();

    assert!(graph.state().keyspaces.contains("tech"));
    assert!(cache.exists("graph_keyspace_tech").await.unwrap());
    let snapshot = ns.snapshot().await;
    assert!(snapshot.entity_map.is_empty());
    assert!(snapshot.rel_map.is_empty());
    assert!(snapshot.rules_map.is_empty());
    assert_eq!(ns.cache_key(), "graph_keyspace_tech");
}

#[tokio::test]
async fn reopen_after_restart_yields_identical_snapshot() {
    let (codex, graph, cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();
    codex
        .load_entity(&ns, &products(), "Product", Some("name"), Deadline::none())
        .await
        .unwrap();
    codex
        .load_relationship(&ns, &produces(), "produces", "Company", "Product", Deadline::none())
        .await
        .unwrap();
    let before = ns.snapshot().await;
    codex.close_namespace(ns);

    // A fresh process: new facade, same cache, graph not consulted for schema.
    let restarted = CodexKg::new(Arc::new(graph.clone()), Arc::new(cache.clone()));
    let keyspaces_before = graph.state().keyspaces.len();
    let reopened = restarted
        .open_namespace("tech", Deadline::none())
        .await
        .unwrap();

    assert_eq!(reopened.snapshot().await, before);
    assert_eq!(graph.state().keyspaces.len(), keyspaces_before);
    assert!(reopened.lookup_relationship("produces").await.is_some());
}

#[tokio::test]
async fn concurrent_handles_detect_conflicts() {
    let graph = FakeGraph::new();
    let cache = MemoryCache::new();
    let first = CodexKg::new(Arc::new(graph.clone()), Arc::new(cache.clone()));
    let second = CodexKg::new(Arc::new(graph.clone()), Arc::new(cache.clone()));

    let ns1 = first.open_namespace("tech", Deadline::none()).await.unwrap();
    let ns2 = second.open_namespace("tech", Deadline::none()).await.unwrap();

    first
        .load_entity(&ns1, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();
    let err = second
        .load_entity(&ns2, &products(), "Product", Some("name"), Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Reopening picks up the other writer's change and the retry succeeds.
    let ns2 = second.open_namespace("tech", Deadline::none()).await.unwrap();
    second
        .load_entity(&ns2, &products(), "Product", Some("name"), Deadline::none())
        .await
        .unwrap();
    let snapshot = ns2.snapshot().await;
    assert!(snapshot.entity_map.contains_key("Company"));
    assert!(snapshot.entity_map.contains_key("Product"));
    assert_eq!(snapshot.version, 2);
}

#[tokio::test]
async fn handles_in_one_process_queue_instead_of_conflicting() {
    let graph = FakeGraph::new();
    let cache = SlowCache::default();
    let codex = CodexKg::new(Arc::new(graph.clone()), Arc::new(cache.clone()));

    let ns1 = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    let ns2 = codex.open_namespace("tech", Deadline::none()).await.unwrap();

    let companies = companies();
    let products = products();
    let (first, second) = tokio::join!(
        codex.load_entity(&ns1, &companies, "Company", Some("name"), Deadline::none()),
        codex.load_entity(&ns2, &products, "Product", Some("name"), Deadline::none()),
    );
    first.unwrap();
    second.unwrap();

    let cached = cache.get("graph_keyspace_tech").await.unwrap().unwrap();
    let cached = Snapshot::from_bytes(&cached).unwrap();
    assert_eq!(cached.version, 2);
    assert!(cached.entity_map.contains_key("Company"));
    assert!(cached.entity_map.contains_key("Product"));
    assert_eq!(ns1.snapshot().await, cached);
    assert_eq!(ns2.snapshot().await, cached);
}

#[tokio::test]
async fn file_cache_accepts_any_valid_namespace_name() {
    let dir = tempfile::tempdir().unwrap();
    let graph = FakeGraph::new();
    let cache = FileCache::new(dir.path()).unwrap();
    let codex = CodexKg::new(Arc::new(graph.clone()), Arc::new(cache));

    for name in ["my graph", "café"] {
        let ns = codex.open_namespace(name, Deadline::none()).await.unwrap();
        codex
            .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
            .await
            .unwrap();
        codex.close_namespace(ns);
    }

    let restarted = CodexKg::new(
        Arc::new(graph.clone()),
        Arc::new(FileCache::new(dir.path()).unwrap()),
    );
    let ns = restarted
        .open_namespace("my graph", Deadline::none())
        .await
        .unwrap();
    assert!(ns.lookup_entity("Company").await.is_some());
    assert_eq!(ns.snapshot().await.version, 1);
}

#[tokio::test]
async fn corrupted_snapshot_is_serialization_error() {
    let (codex, _graph, cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();

    let bytes = cache.get("graph_keyspace_tech").await.unwrap().unwrap();
    let mut tampered: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    tampered["version"] = serde_json::json!(42);
    cache
        .set("graph_keyspace_tech", &serde_json::to_vec(&tampered).unwrap())
        .await
        .unwrap();

    let err = codex
        .open_namespace("tech", Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Serialization);
}

#[tokio::test]
async fn unreachable_collaborators_are_connection_errors() {
    let graph = FakeGraph::new();
    let codex = CodexKg::new(Arc::new(graph.clone()), Arc::new(DownCache));
    let err = codex
        .open_namespace("tech", Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    let (codex, graph, cache) = common::codex();
    graph.state().unreachable = true;
    let err = codex
        .open_namespace("tech", Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(!cache.exists("graph_keyspace_tech").await.unwrap());
}

#[tokio::test]
async fn invalid_namespace_name_is_rejected() {
    let (codex, graph, _cache) = codex();
    let err = codex
        .open_namespace("tech`) DETACH DELETE (n", Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(graph.state().calls, 0);
}

#[tokio::test]
async fn delete_namespace_clears_graph_and_cache() {
    let (codex, graph, cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();
    codex.close_namespace(ns);

    assert_eq!(
        codex.list_keyspaces(Deadline::none()).await.unwrap(),
        vec!["tech".to_string()]
    );
    codex.delete_namespace("tech", Deadline::none()).await.unwrap();

    assert!(codex.list_keyspaces(Deadline::none()).await.unwrap().is_empty());
    assert!(graph.state().entities.is_empty());
    assert!(!cache
        .exists(&Snapshot::cache_key("tech"))
        .await
        .unwrap());

    // Opening again starts from scratch.
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    assert!(ns.snapshot().await.entity_map.is_empty());
}
