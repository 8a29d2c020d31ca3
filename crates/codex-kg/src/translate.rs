//! Query translation: structured descriptors to parameterised Cypher, and
//! returned records back to tables.
//!
//! The translator works against a schema snapshot only; it never talks to the
//! store. Every identifier it interpolates comes from the registered schema and
//! is back-quoted, and every literal travels as a parameter.
//!
//! A Find with a traversal compiles to:
//! ```text
//! MATCH (c:`Company` {_keyspace: $keyspace})
//! MATCH (c)-[r:`produces` {_keyspace: $keyspace}]->(o:`Product` {_keyspace: $keyspace})
//! WHERE c.`name` = $c0
//!   AND o.`name` = $o0
//! RETURN c._codex_id AS c__id, c.`name` AS c_0, ..., o._codex_id AS o__id, o.`name` AS o_0, ...
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use codex_core::{
    AttributeDef, AttributeType, ClusterQuery, CodexError, ComputeQuery, FindQuery, Predicate,
    RelationshipTypeDescriptor, Result, Side, Snapshot, Table, Value,
};
use codex_graph::{ident, CompiledQuery, Record};

pub struct QueryTranslator<'a> {
    schema: &'a Snapshot,
}

/// One entity type whose columns a Find returns, under a node alias.
#[derive(Debug, Clone)]
struct Group {
    name: String,
    alias: &'static str,
    columns: Vec<AttributeDef>,
}

/// A compiled Find and the layout needed to read its records back.
#[derive(Debug, Clone)]
pub struct FindPlan {
    pub query: CompiledQuery,
    groups: Vec<Group>,
}

/// A compiled Cluster: member nodes, and the edges among them.
#[derive(Debug, Clone)]
pub struct ClusterPlan {
    pub nodes: CompiledQuery,
    pub edges: Option<CompiledQuery>,
}

/// WHERE conditions and their parameters, accumulated across aliases.
#[derive(Default)]
struct Filters {
    conditions: Vec<String>,
    params: Vec<(String, Value)>,
}

impl Filters {
    fn push(
        &mut self,
        alias: &str,
        owner: &str,
        attributes: &[AttributeDef],
        predicates: &[Predicate],
    ) -> Result<()> {
        for (i, predicate) in predicates.iter().enumerate() {
            let attr = attributes
                .iter()
                .find(|a| a.name == predicate.attribute)
                .ok_or_else(|| {
                    CodexError::Validation(format!(
                        "{owner} has no attribute {}",
                        predicate.attribute
                    ))
                })?;
            if !predicate.comparator.supports(attr.value_type) {
                return Err(CodexError::Validation(format!(
                    "comparator {} does not apply to {} attribute {}.{}",
                    predicate.comparator,
                    attr.value_type.as_str(),
                    owner,
                    attr.name
                )));
            }
            let literal = literal_for(attr.value_type, &predicate.value).ok_or_else(|| {
                CodexError::Validation(format!(
                    "{} cannot be compared with {} attribute {}.{}",
                    predicate.value,
                    attr.value_type.as_str(),
                    owner,
                    attr.name
                ))
            })?;

            let param = format!("{alias}{i}");
            self.conditions.push(format!(
                "{alias}.{} {} ${param}",
                ident(&attr.name)?,
                predicate.comparator.cypher_operator()
            ));
            self.params.push((param, literal));
        }
        Ok(())
    }

    fn where_clause(&self) -> Option<String> {
        if self.conditions.is_empty() {
            None
        } else {
            Some(format!("WHERE {}", self.conditions.join("\n  AND ")))
        }
    }

    fn into_query(self, clauses: Vec<String>) -> CompiledQuery {
        CompiledQuery {
            text: clauses.join("\n"),
            params: self.params,
        }
    }
}

/// Convert a filter literal to the attribute's type. Numeric attributes also
/// accept fractional literals (`year >= 2015.5`).
fn literal_for(value_type: AttributeType, value: &Value) -> Option<Value> {
    value.coerce(value_type).or_else(|| {
        if value_type.is_numeric() {
            value.coerce(AttributeType::Double)
        } else {
            None
        }
    })
}

fn node_pattern(alias: &str, label: &str) -> Result<String> {
    Ok(format!("({alias}:{} {{_keyspace: $keyspace}})", ident(label)?))
}

impl<'a> QueryTranslator<'a> {
    pub fn new(schema: &'a Snapshot) -> Self {
        Self { schema }
    }

    // ── Find ─────────────────────────────────────────────────────

    pub fn find(&self, query: &FindQuery) -> Result<FindPlan> {
        let entity = self.schema.require_entity(&query.concept)?;
        let mut filters = Filters::default();
        let mut clauses = vec![format!("MATCH {}", node_pattern("c", &entity.name)?)];
        filters.push("c", &entity.name, &entity.attributes, &query.concept_predicates()?)?;

        let mut groups = vec![Group {
            name: entity.name.clone(),
            alias: "c",
            columns: entity.attributes.clone(),
        }];

        if let Some(rel_name) = &query.rel_action {
            let rel = self.schema.require_relationship(rel_name)?;
            let (side, counterpart) = rel.side_of(&entity.name).ok_or_else(|| {
                CodexError::Schema(format!(
                    "{} plays no role in relationship {}",
                    entity.name, rel.name
                ))
            })?;
            if let Some(target) = &query.concept_rels {
                if target != &counterpart.entity {
                    return Err(CodexError::Validation(format!(
                        "relationship {} links {} to {}, not {target}",
                        rel.name, entity.name, counterpart.entity
                    )));
                }
            }
            let other = self.schema.require_entity(&counterpart.entity)?;

            let edge = format!("[r:{} {{_keyspace: $keyspace}}]", ident(&rel.name)?);
            let far = node_pattern("o", &other.name)?;
            clauses.push(match side {
                Side::Source => format!("MATCH (c)-{edge}->{far}"),
                Side::Target => format!("MATCH (c)<-{edge}-{far}"),
            });
            filters.push("o", &other.name, &other.attributes, &query.related_predicates()?)?;
            filters.push("r", &rel.name, &rel.attributes, &query.relationship_predicates()?)?;

            let name = if other.name == entity.name {
                format!("{}.{}", rel.name, other.name)
            } else {
                other.name.clone()
            };
            groups.push(Group {
                name,
                alias: "o",
                columns: other.attributes.clone(),
            });
        }

        clauses.extend(filters.where_clause());
        let mut returns = Vec::new();
        for group in &groups {
            let a = group.alias;
            returns.push(format!("{a}._codex_id AS {a}__id"));
            for (i, column) in group.columns.iter().enumerate() {
                returns.push(format!("{a}.{} AS {a}_{i}", ident(&column.name)?));
            }
        }
        clauses.push(format!("RETURN {}", returns.join(", ")));

        Ok(FindPlan {
            query: filters.into_query(clauses),
            groups,
        })
    }

    // ── Compute ──────────────────────────────────────────────────

    pub fn compute(&self, query: &ComputeQuery) -> Result<CompiledQuery> {
        let entity = self.schema.require_entity(&query.concept)?;
        let mut filters = Filters::default();
        filters.push("c", &entity.name, &entity.attributes, &query.predicates()?)?;

        let expr = match &query.attr {
            Some(name) => {
                let attr = entity.attribute(name).ok_or_else(|| {
                    CodexError::Validation(format!("{} has no attribute {name}", entity.name))
                })?;
                if query.op.requires_numeric() && !attr.value_type.is_numeric() {
                    return Err(CodexError::Validation(format!(
                        "{:?} needs a numeric attribute, {}.{name} is {}",
                        query.op,
                        entity.name,
                        attr.value_type.as_str()
                    )));
                }
                format!("c.{}", ident(name)?)
            }
            None => "c".to_string(),
        };

        let mut clauses = vec![format!("MATCH {}", node_pattern("c", &entity.name)?)];
        clauses.extend(filters.where_clause());
        clauses.push(format!("RETURN {} AS value", query.op.aggregate(&expr)));
        Ok(filters.into_query(clauses))
    }

    // ── Cluster ──────────────────────────────────────────────────

    pub fn cluster(&self, query: &ClusterQuery) -> Result<ClusterPlan> {
        let mut labels = Vec::new();
        for concept in &query.concepts {
            let entity = self.schema.require_entity(concept)?;
            labels.push(ident(&entity.name)?);
        }

        let relationships: Vec<&RelationshipTypeDescriptor> = if query.relationships.is_empty() {
            self.schema
                .rel_map
                .values()
                .filter(|r| {
                    query.concepts.contains(&r.role1.entity)
                        && query.concepts.contains(&r.role2.entity)
                })
                .collect()
        } else {
            query
                .relationships
                .iter()
                .map(|name| self.schema.require_relationship(name))
                .collect::<Result<_>>()?
        };

        let member = |var: &str| {
            labels
                .iter()
                .map(|label| format!("{var}:{label}"))
                .collect::<Vec<_>>()
                .join(" OR ")
        };

        let nodes = CompiledQuery::new(format!(
            "MATCH (n {{_keyspace: $keyspace}})\nWHERE {}\nRETURN n._codex_id AS id, head(labels(n)) AS concept\nORDER BY concept, id",
            member("n")
        ));

        let edges = if relationships.is_empty() {
            None
        } else {
            let types = relationships
                .iter()
                .map(|r| ident(&r.name))
                .collect::<std::result::Result<Vec<_>, _>>()?
                .join("|");
            Some(CompiledQuery::new(format!(
                "MATCH (a {{_keyspace: $keyspace}})-[r:{types} {{_keyspace: $keyspace}}]->(b {{_keyspace: $keyspace}})\nWHERE ({}) AND ({})\nRETURN a._codex_id AS source, b._codex_id AS target",
                member("a"),
                member("b")
            )))
        };

        Ok(ClusterPlan { nodes, edges })
    }
}

impl FindPlan {
    /// Split records into one table per returned entity type. A node matched
    /// through several relationships appears once.
    pub fn reshape(&self, records: &[Record]) -> Result<BTreeMap<String, Table>> {
        let mut tables = BTreeMap::new();
        for group in &self.groups {
            let mut table = Table::new(group.columns.iter().map(|c| c.name.clone()));
            let id_column = format!("{}__id", group.alias);
            let mut seen = HashSet::new();

            for record in records {
                if let Some(id) = record.get(&id_column).and_then(|v| v.as_str()) {
                    if !seen.insert(id.to_string()) {
                        continue;
                    }
                }
                let row = group
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| {
                        let raw = record
                            .get(&format!("{}_{i}", group.alias))
                            .map(Value::from_json)
                            .unwrap_or(Value::Null);
                        raw.coerce(column.value_type).unwrap_or(raw)
                    })
                    .collect();
                table.push_row(row)?;
            }
            tables.insert(group.name.clone(), table);
        }
        Ok(tables)
    }
}

/// Read the scalar a compute query returns; no row reads as null.
pub fn compute_value(records: &[Record]) -> Value {
    records
        .first()
        .and_then(|r| r.get("value"))
        .map(Value::from_json)
        .unwrap_or(Value::Null)
}

/// Group nodes into connected components over undirected edges. Clusters are
/// numbered from 0 in order of their first node; edges to nodes outside the
/// set are ignored.
pub fn connected_components(nodes: &[Record], edges: &[Record]) -> Result<Table> {
    let field = |record: &Record, name: &str| -> Result<String> {
        record
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CodexError::Serialization(format!("cluster record is missing {name}")))
    };

    let mut members = Vec::with_capacity(nodes.len());
    let mut index = HashMap::new();
    for record in nodes {
        let id = field(record, "id")?;
        let concept = field(record, "concept")?;
        if index.contains_key(&id) {
            continue;
        }
        index.insert(id.clone(), members.len());
        members.push((concept, id));
    }

    let mut parent: Vec<usize> = (0..members.len()).collect();
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for record in edges {
        let source = field(record, "source")?;
        let target = field(record, "target")?;
        if let (Some(&a), Some(&b)) = (index.get(&source), index.get(&target)) {
            let (ra, rb) = (root(&mut parent, a), root(&mut parent, b));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }
    }

    let mut cluster_of_root = HashMap::new();
    let mut assigned = Vec::with_capacity(members.len());
    for i in 0..members.len() {
        let r = root(&mut parent, i);
        let next = cluster_of_root.len() as i64;
        assigned.push((*cluster_of_root.entry(r).or_insert(next), i));
    }
    assigned.sort();

    let mut table = Table::new(["cluster", "concept", "id"]);
    for (cluster, i) in assigned {
        let (concept, id) = &members[i];
        table.push_row(vec![
            Value::Long(cluster),
            Value::from(concept.as_str()),
            Value::from(id.as_str()),
        ])?;
    }
    Ok(table)
}
