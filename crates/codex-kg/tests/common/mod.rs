//! In-process fakes of the graph store and metadata cache.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use codex_cache::{CacheError, MemoryCache, MetadataCache};
use codex_core::{AttributeType, Table, Value};
use codex_graph::{CompiledQuery, GraphError, GraphSession, GraphStore, InstanceId, Record};
use codex_kg::CodexKg;

#[derive(Debug, Clone)]
pub struct FakeEntity {
    pub keyspace: String,
    pub entity_type: String,
    pub id: InstanceId,
    pub attributes: Vec<(String, Value)>,
}

#[derive(Debug, Clone)]
pub struct FakeRelationship {
    pub keyspace: String,
    pub rel_type: String,
    pub players: [(String, InstanceId); 2],
    pub attributes: Vec<(String, Value)>,
}

/// Answers a `query` from the stored instances when no scripted response is
/// queued.
pub type Evaluator = Arc<dyn Fn(&FakeState, &CompiledQuery) -> Vec<Record> + Send + Sync>;

#[derive(Default)]
pub struct FakeState {
    pub keyspaces: BTreeSet<String>,
    pub entity_types: BTreeMap<String, Option<String>>,
    pub attribute_types: BTreeMap<String, AttributeType>,
    pub relationship_types: BTreeMap<String, (String, String)>,
    pub rules: Vec<(String, String, String)>,
    pub entities: Vec<FakeEntity>,
    pub relationships: Vec<FakeRelationship>,
    /// Every statement sent through `query` or `execute`.
    pub statements: Vec<CompiledQuery>,
    /// Scripted answers for `query`, consumed in order.
    pub responses: VecDeque<Vec<Record>>,
    pub evaluator: Option<Evaluator>,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    /// Total calls on the store and its sessions.
    pub calls: usize,
    pub unreachable: bool,
    pub query_delay: Option<Duration>,
}

/// A graph store that keeps everything in memory. Keyspace isolation is not
/// modelled beyond tagging instances.
#[derive(Clone, Default)]
pub struct FakeGraph {
    state: Arc<Mutex<FakeState>>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn respond(&self, records: Vec<Record>) {
        self.state().responses.push_back(records);
    }

    pub fn entities_of(&self, entity_type: &str) -> Vec<FakeEntity> {
        self.state()
            .entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect()
    }

    pub fn entity(&self, id: InstanceId) -> Option<FakeEntity> {
        self.state().entities.iter().find(|e| e.id == id).cloned()
    }

    fn touch(&self) -> Result<(), GraphError> {
        let mut state = self.state();
        state.calls += 1;
        if state.unreachable {
            return Err(GraphError::Connection("connection refused".into()));
        }
        Ok(())
    }
}

pub struct FakeSession {
    keyspace: String,
    graph: FakeGraph,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.graph.state().sessions_closed += 1;
    }
}

#[async_trait]
impl GraphSession for FakeSession {
    fn keyspace(&self) -> &str {
        &self.keyspace
    }

    async fn define_entity_type(&self, name: &str, key: Option<&str>) -> Result<(), GraphError> {
        self.graph.touch()?;
        self.graph
            .state()
            .entity_types
            .insert(name.to_string(), key.map(str::to_string));
        Ok(())
    }

    async fn define_attribute_type(
        &self,
        name: &str,
        value_type: AttributeType,
    ) -> Result<(), GraphError> {
        self.graph.touch()?;
        let mut state = self.graph.state();
        match state.attribute_types.get(name) {
            Some(existing) if *existing != value_type => Err(GraphError::SchemaConflict {
                attribute: name.to_string(),
                existing: existing.as_str().to_string(),
                requested: value_type.as_str().to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                state.attribute_types.insert(name.to_string(), value_type);
                Ok(())
            }
        }
    }

    async fn define_relationship_type(
        &self,
        name: &str,
        role1: &str,
        role2: &str,
    ) -> Result<(), GraphError> {
        self.graph.touch()?;
        self.graph.state().relationship_types.insert(
            name.to_string(),
            (role1.to_string(), role2.to_string()),
        );
        Ok(())
    }

    async fn define_rule(&self, name: &str, when: &str, then: &str) -> Result<String, GraphError> {
        self.graph.touch()?;
        self.graph
            .state()
            .rules
            .push((name.to_string(), when.to_string(), then.to_string()));
        Ok(format!("MATCH {when}\n{then}"))
    }

    async fn insert_entity(
        &self,
        entity_type: &str,
        attributes: &[(String, Value)],
    ) -> Result<InstanceId, GraphError> {
        self.graph.touch()?;
        let id = InstanceId::new();
        self.graph.state().entities.push(FakeEntity {
            keyspace: self.keyspace.clone(),
            entity_type: entity_type.to_string(),
            id,
            attributes: attributes.to_vec(),
        });
        Ok(id)
    }

    async fn find_instance(
        &self,
        entity_type: &str,
        attribute: &str,
        value: &Value,
    ) -> Result<Option<InstanceId>, GraphError> {
        self.graph.touch()?;
        let state = self.graph.state();
        Ok(state
            .entities
            .iter()
            .find(|e| {
                e.keyspace == self.keyspace
                    && e.entity_type == entity_type
                    && e.attributes.iter().any(|(n, v)| n == attribute && v == value)
            })
            .map(|e| e.id))
    }

    async fn insert_relationship(
        &self,
        rel_type: &str,
        players: [(&str, InstanceId); 2],
        attributes: &[(String, Value)],
    ) -> Result<InstanceId, GraphError> {
        self.graph.touch()?;
        let mut state = self.graph.state();
        for (_, id) in players {
            if !state.entities.iter().any(|e| e.id == id) {
                return Err(GraphError::MissingInstance(id.to_string()));
            }
        }
        let [(role1, from), (role2, to)] = players;
        state.relationships.push(FakeRelationship {
            keyspace: self.keyspace.clone(),
            rel_type: rel_type.to_string(),
            players: [(role1.to_string(), from), (role2.to_string(), to)],
            attributes: attributes.to_vec(),
        });
        Ok(InstanceId::new())
    }

    async fn query(&self, query: &CompiledQuery) -> Result<Vec<Record>, GraphError> {
        self.graph.touch()?;
        let delay = {
            let mut state = self.graph.state();
            state.statements.push(query.clone());
            state.query_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.graph.state();
        if let Some(records) = state.responses.pop_front() {
            return Ok(records);
        }
        Ok(match state.evaluator.clone() {
            Some(evaluate) => evaluate(&*state, query),
            None => Vec::new(),
        })
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<Vec<Record>, GraphError> {
        self.graph.touch()?;
        self.graph.state().statements.push(query.clone());
        Ok(Vec::new())
    }
}

#[async_trait]
impl GraphStore for FakeGraph {
    async fn open(&self, keyspace: &str) -> Result<Box<dyn GraphSession>, GraphError> {
        self.touch()?;
        self.state().sessions_opened += 1;
        Ok(Box::new(FakeSession {
            keyspace: keyspace.to_string(),
            graph: self.clone(),
        }))
    }

    async fn create_keyspace(&self, name: &str) -> Result<(), GraphError> {
        self.touch()?;
        self.state().keyspaces.insert(name.to_string());
        Ok(())
    }

    async fn list_keyspaces(&self) -> Result<Vec<String>, GraphError> {
        self.touch()?;
        Ok(self.state().keyspaces.iter().cloned().collect())
    }

    async fn delete_keyspace(&self, name: &str) -> Result<(), GraphError> {
        self.touch()?;
        let mut state = self.state();
        state.keyspaces.remove(name);
        state.entities.retain(|e| e.keyspace != name);
        state.relationships.retain(|r| r.keyspace != name);
        Ok(())
    }
}

/// A cache whose every call fails.
pub struct DownCache;

#[async_trait]
impl MetadataCache for DownCache {
    async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("cache is down".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Unavailable("cache is down".into()))
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("cache is down".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("cache is down".into()))
    }
}

/// An in-memory cache whose reads take a while, so concurrent operations
/// interleave between reading and writing a snapshot.
#[derive(Clone, Default)]
pub struct SlowCache {
    inner: MemoryCache,
}

#[async_trait]
impl MetadataCache for SlowCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }
}

pub fn codex() -> (CodexKg, FakeGraph, MemoryCache) {
    let graph = FakeGraph::new();
    let cache = MemoryCache::new();
    let codex = CodexKg::new(Arc::new(graph.clone()), Arc::new(cache.clone()));
    (codex, graph, cache)
}

pub fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
    let mut table = Table::new(columns.iter().copied());
    for row in rows {
        table.push_row(row).unwrap();
    }
    table
}

pub fn companies() -> Table {
    table(
        &["name", "budget"],
        vec![
            vec![Value::from("Google"), Value::from(999.99)],
            vec![Value::from("Apple"), Value::from(1200.5)],
        ],
    )
}

pub fn products() -> Table {
    table(
        &["name", "year"],
        vec![
            vec![Value::from("Pixel"), Value::from(2016)],
            vec![Value::from("iPhone"), Value::from(2007)],
        ],
    )
}

pub fn produces() -> Table {
    table(
        &["producer", "produced", "since"],
        vec![
            vec![Value::from("Google"), Value::from("Pixel"), Value::from(2016)],
            vec![Value::from("Apple"), Value::from("iPhone"), Value::from(2007)],
        ],
    )
}

pub fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
