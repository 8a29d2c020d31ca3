//! Entity and relationship loading against the in-memory graph.

mod common;

use codex_core::{AttributeType, Deadline, EntityRelation, ErrorKind, Value};

use common::{codex, companies, produces, products, table};

#[tokio::test]
async fn load_entity_infers_types_and_flags_key() {
    let (codex, graph, _cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();

    let report = codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();
    assert_eq!(report.inserted, 2);
    assert!(report.is_complete());

    let company = ns.lookup_entity("Company").await.unwrap();
    assert_eq!(company, report.descriptor);
    assert_eq!(company.key.as_deref(), Some("name"));
    let name = company.attribute("name").unwrap();
    assert_eq!(name.value_type, AttributeType::String);
    assert!(name.key);
    let budget = company.attribute("budget").unwrap();
    assert_eq!(budget.value_type, AttributeType::Double);
    assert!(!budget.key);
    assert_eq!(company.attributes.iter().filter(|a| a.key).count(), 1);

    let state = graph.state();
    assert_eq!(state.entity_types["Company"].as_deref(), Some("name"));
    assert_eq!(state.attribute_types["budget"], AttributeType::Double);
    assert_eq!(state.entities.len(), 2);
    assert_eq!(state.sessions_opened, state.sessions_closed);
}

#[tokio::test]
async fn reloading_same_entity_inserts_rows_again() {
    let (codex, graph, _cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();

    let first = codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();
    let version = ns.snapshot().await.version;
    let second = codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();

    assert_eq!(first.descriptor, second.descriptor);
    assert_eq!(ns.snapshot().await.version, version);
    assert_eq!(graph.entities_of("Company").len(), 4);
}

#[tokio::test]
async fn redefining_entity_differently_is_schema_error() {
    let (codex, graph, _cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();

    let err = codex
        .load_entity(&ns, &companies(), "Company", Some("budget"), Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert_eq!(graph.entities_of("Company").len(), 2);

    let err = codex
        .load_entity(&ns, &companies(), "Startup", Some("ceo"), Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[tokio::test]
async fn conflicting_attribute_type_aborts_before_rows() {
    let (codex, graph, _cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();

    // `budget` already exists in the keyspace as a double.
    let grants = table(
        &["title", "budget"],
        vec![vec![Value::from("Moonshot"), Value::from("large")]],
    );
    let err = codex
        .load_entity(&ns, &grants, "Grant", Some("title"), Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(graph.entities_of("Grant").is_empty());
    assert!(ns.lookup_entity("Grant").await.is_none());
}

#[tokio::test]
async fn relationship_rows_link_players_by_key() {
    let (codex, graph, _cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();
    codex
        .load_entity(&ns, &products(), "Product", Some("name"), Deadline::none())
        .await
        .unwrap();

    let report = codex
        .load_relationship(&ns, &produces(), "produces", "Company", "Product", Deadline::none())
        .await
        .unwrap();
    assert_eq!(report.inserted, 2);
    assert!(report.is_complete());
    assert_eq!(report.descriptor.role1.role, "producer");
    assert_eq!(report.descriptor.role2.role, "produced");

    let relationships = graph.state().relationships.clone();
    assert_eq!(relationships.len(), 2);
    for (rel, expected) in relationships.iter().zip([("Google", "Pixel"), ("Apple", "iPhone")]) {
        let [(role1, from), (role2, to)] = &rel.players;
        assert_eq!(role1, "producer");
        assert_eq!(role2, "produced");
        let from = graph.entity(*from).unwrap();
        let to = graph.entity(*to).unwrap();
        assert_eq!(from.entity_type, "Company");
        assert_eq!(from.attributes[0].1, Value::from(expected.0));
        assert_eq!(to.entity_type, "Product");
        assert_eq!(to.attributes[0].1, Value::from(expected.1));
    }
    assert_eq!(relationships[0].attributes, vec![("since".to_string(), Value::Long(2016))]);

    let company = ns.lookup_entity("Company").await.unwrap();
    assert_eq!(
        company.relationships["produces"],
        EntityRelation {
            plays: "producer".into(),
            with_ent: "Product".into(),
        }
    );
    let product = ns.lookup_entity("Product").await.unwrap();
    assert_eq!(product.relationships["produces"].plays, "produced");
    assert_eq!(product.relationships["produces"].with_ent, "Company");
}

#[tokio::test]
async fn unresolved_players_are_reported_per_row() {
    let (codex, graph, _cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();
    codex
        .load_entity(&ns, &products(), "Product", Some("name"), Deadline::none())
        .await
        .unwrap();

    let mut rows = produces();
    rows.push_row(vec![Value::from("Nokia"), Value::from("Pixel"), Value::from(2020)])
        .unwrap();
    rows.push_row(vec![Value::from("Google"), Value::from("Nest"), Value::Null])
        .unwrap();

    let report = codex
        .load_relationship(&ns, &rows, "produces", "Company", "Product", Deadline::none())
        .await
        .unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.row_errors.len(), 2);
    assert_eq!(report.row_errors[0].row, 2);
    assert_eq!(report.row_errors[0].kind, ErrorKind::Lookup);
    assert!(report.row_errors[0].message.contains("Nokia"));
    assert_eq!(report.row_errors[1].row, 3);
    assert!(report.row_errors[1].message.contains("Nest"));
    assert_eq!(graph.state().relationships.len(), 2);
    assert!(ns.lookup_relationship("produces").await.is_some());
}

#[tokio::test]
async fn relationship_requires_loaded_keyed_entities() {
    let (codex, graph, _cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();
    let opened = graph.state().sessions_opened;

    let err = codex
        .load_relationship(&ns, &produces(), "produces", "Company", "Product", Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(err.to_string().contains("Product"));

    codex
        .load_entity(&ns, &products(), "Product", None, Deadline::none())
        .await
        .unwrap();
    let opened_after_products = graph.state().sessions_opened;
    let err = codex
        .load_relationship(&ns, &produces(), "produces", "Company", "Product", Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);

    assert_eq!(opened + 1, opened_after_products);
    assert_eq!(graph.state().sessions_opened, opened_after_products);
    assert!(graph.state().relationships.is_empty());
}

#[tokio::test]
async fn relationship_table_needs_two_columns() {
    let (codex, _graph, _cache) = codex();
    let ns = codex.open_namespace("tech", Deadline::none()).await.unwrap();
    codex
        .load_entity(&ns, &companies(), "Company", Some("name"), Deadline::none())
        .await
        .unwrap();

    let narrow = table(&["producer"], vec![vec![Value::from("Google")]]);
    let err = codex
        .load_relationship(&ns, &narrow, "produces", "Company", "Company", Deadline::none())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
