//! End-to-end tests against a live Neo4j instance.
//!
//! Run with: cargo test --package codex-kg --test live -- --ignored
//!
//! Skipped automatically if Neo4j is not available.

mod common;

use std::sync::Arc;

use codex_cache::MemoryCache;
use codex_core::{Comparator, Deadline, FindQuery, QueryDescriptor, QueryResult, Value};
use codex_graph::{GraphConfig, GraphStore, Neo4jStore};
use codex_kg::{CodexKg, Namespace};
use uuid::Uuid;

use common::{companies, produces, products};

async fn open_or_skip() -> Option<(CodexKg, Namespace)> {
    let store = Neo4jStore::new(GraphConfig::default());
    if let Err(e) = store.list_keyspaces().await {
        eprintln!("Skipping live test (Neo4j not available): {e}");
        return None;
    }
    let codex = CodexKg::new(Arc::new(store), Arc::new(MemoryCache::new()));
    let keyspace = format!("live_{}", Uuid::new_v4().simple());
    let ns = codex.open_namespace(&keyspace, Deadline::none()).await.ok()?;
    Some((codex, ns))
}

fn google_makes(product: &str) -> QueryDescriptor {
    QueryDescriptor::Find(
        FindQuery::new("Company")
            .filter("name", Comparator::Equals, "Google")
            .traverse("produces", "Product")
            .filter_related("name", Comparator::Equals, product),
    )
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_traversal_end_to_end() {
    let Some((codex, ns)) = open_or_skip().await else {
        return;
    };
    let deadline = Deadline::none();

    codex
        .load_entity(&ns, &companies(), "Company", Some("name"), deadline)
        .await
        .unwrap();
    codex
        .load_entity(&ns, &products(), "Product", Some("name"), deadline)
        .await
        .unwrap();
    let report = codex
        .load_relationship(&ns, &produces(), "produces", "Company", "Product", deadline)
        .await
        .unwrap();
    assert_eq!(report.inserted, 2);

    let QueryResult::Find(tables) = codex
        .run_query(&ns, &google_makes("Pixel"), deadline)
        .await
        .unwrap()
    else {
        panic!("expected a find result");
    };
    let company = &tables["Company"];
    assert_eq!(company.len(), 1);
    assert_eq!(company.get(0, "name"), Some(&Value::from("Google")));
    assert_eq!(company.get(0, "budget"), Some(&Value::Double(999.99)));

    let QueryResult::Find(tables) = codex
        .run_query(&ns, &google_makes("iPhone"), deadline)
        .await
        .unwrap()
    else {
        panic!("expected a find result");
    };
    assert!(tables["Company"].is_empty());

    codex.delete_namespace(ns.name(), deadline).await.unwrap();
}
