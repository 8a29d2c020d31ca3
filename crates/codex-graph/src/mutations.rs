//! Schema definition and instance insertion.
//!
//! Neo4j has no declared schema, so type definitions are recorded as
//! bookkeeping nodes (`CodexEntityType`, `CodexAttribute`, `CodexRelationType`,
//! `CodexRule`) merged by `(_keyspace, name)`. Entity instances are nodes
//! labelled with their type; relationship instances are edges pointing from
//! the role 1 player to the role 2 player.

use chrono::Utc;
use neo4rs::query;

use codex_core::{AttributeType, Value};

use crate::client::{bind_value, GraphError, Neo4jSession};
use crate::store::{ident, InstanceId};

impl Neo4jSession {
    // ── Keyspaces ────────────────────────────────────────────────

    pub(crate) async fn merge_keyspace(&self) -> Result<(), GraphError> {
        let q = self
            .statement(
                "MERGE (k:CodexKeyspace {name: $keyspace})
                 ON CREATE SET k.created_at = $now",
            )
            .param("now", Utc::now().to_rfc3339());
        self.run(q).await?;
        tracing::info!(keyspace = %self.keyspace, "Keyspace ready");
        Ok(())
    }

    pub(crate) async fn detach_keyspace(&self) -> Result<(), GraphError> {
        self.run(self.statement(
            "MATCH (n {_keyspace: $keyspace})
             DETACH DELETE n",
        ))
        .await?;
        self.run(self.statement(
            "MATCH (k:CodexKeyspace {name: $keyspace})
             DELETE k",
        ))
        .await?;
        tracing::info!(keyspace = %self.keyspace, "Keyspace deleted");
        Ok(())
    }

    // ── Schema ───────────────────────────────────────────────────

    pub(crate) async fn merge_entity_type(
        &self,
        name: &str,
        key: Option<&str>,
    ) -> Result<(), GraphError> {
        let label = ident(name)?;
        let q = self
            .statement(
                "MERGE (t:CodexEntityType {_keyspace: $keyspace, name: $name})
                 ON CREATE SET t.key = $key, t.created_at = $now",
            )
            .param("name", name.to_string())
            .param("key", key.unwrap_or_default().to_string())
            .param("now", Utc::now().to_rfc3339());
        self.run(q).await?;

        // Key lookups during relationship loading filter on (keyspace, key).
        if let Some(key) = key {
            let property = ident(key)?;
            let index = format!(
                "CREATE INDEX IF NOT EXISTS FOR (n:{label}) ON (n._keyspace, n.{property})"
            );
            self.run(query(&index)).await?;
        }
        Ok(())
    }

    pub(crate) async fn merge_attribute_type(
        &self,
        name: &str,
        value_type: AttributeType,
    ) -> Result<(), GraphError> {
        ident(name)?;
        let q = self
            .statement(
                "MERGE (a:CodexAttribute {_keyspace: $keyspace, name: $name})
                 ON CREATE SET a.value_type = $value_type
                 RETURN a.value_type AS value_type",
            )
            .param("name", name.to_string())
            .param("value_type", value_type.as_str().to_string());

        let existing = match self.one(q).await? {
            Some(row) => row.get::<String>("value_type").map_err(|e| {
                GraphError::Serialization(format!("Failed to read type of {name}: {e}"))
            })?,
            None => return Ok(()),
        };
        if existing != value_type.as_str() {
            return Err(GraphError::SchemaConflict {
                attribute: name.to_string(),
                existing,
                requested: value_type.as_str().to_string(),
            });
        }
        Ok(())
    }

    pub(crate) async fn merge_relationship_type(
        &self,
        name: &str,
        role1: &str,
        role2: &str,
    ) -> Result<(), GraphError> {
        ident(name)?;
        let q = self
            .statement(
                "MERGE (t:CodexRelationType {_keyspace: $keyspace, name: $name})
                 SET t.role1 = $role1, t.role2 = $role2",
            )
            .param("name", name.to_string())
            .param("role1", role1.to_string())
            .param("role2", role2.to_string());
        self.run(q).await
    }

    /// Materialise the rule once and store it: the `when` pattern is matched
    /// and the `then` clause applied to every match. Both happen in one
    /// transaction, so a failing rule leaves no bookkeeping node behind.
    pub(crate) async fn merge_rule(
        &self,
        name: &str,
        when: &str,
        then: &str,
    ) -> Result<String, GraphError> {
        let compiled = format!("MATCH {}\n{}", when.trim(), then.trim());
        let record = self
            .statement(
                "MERGE (r:CodexRule {_keyspace: $keyspace, name: $name})
                 SET r.when = $when, r.then = $then, r.compiled = $compiled, r.defined_at = $now",
            )
            .param("name", name.to_string())
            .param("when", when.to_string())
            .param("then", then.to_string())
            .param("compiled", compiled.clone())
            .param("now", Utc::now().to_rfc3339());
        self.run_in_txn([self.statement(&compiled), record]).await?;

        tracing::info!(rule = %name, "Rule defined");
        Ok(compiled)
    }

    // ── Instances ────────────────────────────────────────────────

    pub(crate) async fn create_entity(
        &self,
        entity_type: &str,
        attributes: &[(String, Value)],
    ) -> Result<InstanceId, GraphError> {
        let label = ident(entity_type)?;
        let (assignments, params) = set_clause("n", attributes)?;
        let cypher = format!(
            "CREATE (n:{label} {{_keyspace: $keyspace, _codex_id: $id}}){assignments}"
        );

        let id = InstanceId::new();
        let q = params.iter().fold(
            self.statement(&cypher).param("id", id.to_string()),
            |q, (name, value)| bind_value(q, name, value),
        );
        self.run(q).await?;
        Ok(id)
    }

    pub(crate) async fn find_by_attribute(
        &self,
        entity_type: &str,
        attribute: &str,
        value: &Value,
    ) -> Result<Option<InstanceId>, GraphError> {
        let label = ident(entity_type)?;
        let property = ident(attribute)?;
        let cypher = format!(
            "MATCH (n:{label} {{_keyspace: $keyspace}})
             WHERE n.{property} = $value
             RETURN n._codex_id AS id
             LIMIT 1"
        );
        let q = bind_value(self.statement(&cypher), "value", value);

        match self.one(q).await? {
            Some(row) => {
                let id: String = row.get("id").map_err(|e| {
                    GraphError::Serialization(format!("Failed to read instance id: {e}"))
                })?;
                Ok(Some(id.parse()?))
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn create_relationship(
        &self,
        rel_type: &str,
        players: [(&str, InstanceId); 2],
        attributes: &[(String, Value)],
    ) -> Result<InstanceId, GraphError> {
        let rel = ident(rel_type)?;
        let (assignments, params) = set_clause("r", attributes)?;
        let [(role1, from), (role2, to)] = players;
        let cypher = format!(
            "MATCH (a {{_keyspace: $keyspace, _codex_id: $from}})
             MATCH (b {{_keyspace: $keyspace, _codex_id: $to}})
             CREATE (a)-[r:{rel} {{_keyspace: $keyspace, _codex_id: $id, _role1: $role1, _role2: $role2}}]->(b){assignments}
             RETURN r._codex_id AS id"
        );

        let id = InstanceId::new();
        let q = self
            .statement(&cypher)
            .param("from", from.to_string())
            .param("to", to.to_string())
            .param("id", id.to_string())
            .param("role1", role1.to_string())
            .param("role2", role2.to_string());
        let q = params
            .iter()
            .fold(q, |q, (name, value)| bind_value(q, name, value));

        match self.one(q).await? {
            Some(_) => Ok(id),
            None => Err(GraphError::MissingInstance(format!(
                "{rel_type} players {from} / {to}"
            ))),
        }
    }
}

/// Build ` SET v.`a` = $a0, ...` for the non-null attributes.
fn set_clause(
    var: &str,
    attributes: &[(String, Value)],
) -> Result<(String, Vec<(String, Value)>), GraphError> {
    let mut assignments = Vec::new();
    let mut params = Vec::new();
    for (i, (name, value)) in attributes.iter().enumerate() {
        if value.is_null() {
            continue;
        }
        let param = format!("a{i}");
        assignments.push(format!("{var}.{} = ${param}", ident(name)?));
        params.push((param, value.clone()));
    }
    if assignments.is_empty() {
        return Ok((String::new(), params));
    }
    Ok((format!("\n SET {}", assignments.join(", ")), params))
}
