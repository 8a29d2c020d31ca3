//! Schema descriptors and the cached registry snapshot.
//!
//! A [`Snapshot`] is the unit persisted to the metadata cache. Its JSON form is
//! `{version, entity_map, rel_map, rules_map, checksum, updated_at}`; the maps
//! are keyed by type name.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CodexError, Result};
use crate::types::{AttributeType, Table};

/// Prefix of every snapshot key in the metadata cache.
pub const CACHE_KEY_PREFIX: &str = "graph_keyspace_";

// ── Entity Types ─────────────────────────────────────────────────

/// One attribute of an entity or relationship type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: AttributeType,
    #[serde(default)]
    pub key: bool,
}

/// The role an entity type plays in a relationship, and with whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRelation {
    pub plays: String,
    pub with_ent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeDescriptor {
    pub name: String,
    pub key: Option<String>,
    /// Attributes in column order.
    pub attributes: Vec<AttributeDef>,
    /// Relationship name to the role this entity plays in it.
    #[serde(default)]
    pub relationships: BTreeMap<String, EntityRelation>,
}

impl EntityTypeDescriptor {
    /// Derive an entity type from a table: one attribute per column, typed by
    /// the column's values, with `key` flagged if given.
    pub fn from_table(name: &str, table: &Table, key: Option<&str>) -> Result<Self> {
        table.validate()?;
        if let Some(key) = key {
            if table.column_index(key).is_none() {
                return Err(CodexError::Schema(format!(
                    "key column {key} is not a column of {name}"
                )));
            }
        }

        let attributes = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| AttributeDef {
                name: column.clone(),
                value_type: AttributeType::infer(table.column_values(i)),
                key: key == Some(column.as_str()),
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            key: key.map(str::to_string),
            attributes,
            relationships: BTreeMap::new(),
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn key_attribute(&self) -> Option<&AttributeDef> {
        self.key.as_deref().and_then(|k| self.attribute(k))
    }

    /// Entity types are immutable once registered: a reload must carry the same
    /// key and attribute typing. Relationship bookkeeping is not compared.
    pub fn ensure_same_definition(&self, other: &Self) -> Result<()> {
        if self.key != other.key || self.attributes != other.attributes {
            return Err(CodexError::Schema(format!(
                "entity type {} is already defined with a different key or attributes",
                self.name
            )));
        }
        Ok(())
    }
}

// ── Relationship Types ───────────────────────────────────────────

/// One side of a relationship: the role name and the entity type playing it,
/// with that entity's key copied at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub role: String,
    pub entity: String,
    pub key: Option<String>,
    pub key_type: Option<AttributeType>,
}

impl RoleBinding {
    pub fn new(role: &str, entity: &EntityTypeDescriptor) -> Self {
        let key_attr = entity.key_attribute();
        Self {
            role: role.to_string(),
            entity: entity.name.clone(),
            key: key_attr.map(|a| a.name.clone()),
            key_type: key_attr.map(|a| a.value_type),
        }
    }
}

/// Which end of a directed relationship edge an entity sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Role 1 player; edges point away from it.
    Source,
    /// Role 2 player; edges point at it.
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipTypeDescriptor {
    pub name: String,
    pub role1: RoleBinding,
    pub role2: RoleBinding,
    /// Relationship-scoped attributes, in column order.
    pub attributes: Vec<AttributeDef>,
}

impl RelationshipTypeDescriptor {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Resolve the side `entity` plays, and the binding of its counterpart.
    /// When both roles are played by the same type, role 1 wins.
    pub fn side_of(&self, entity: &str) -> Option<(Side, &RoleBinding)> {
        if self.role1.entity == entity {
            Some((Side::Source, &self.role2))
        } else if self.role2.entity == entity {
            Some((Side::Target, &self.role1))
        } else {
            None
        }
    }

    pub fn ensure_same_definition(&self, other: &Self) -> Result<()> {
        if self != other {
            return Err(CodexError::Schema(format!(
                "relationship type {} is already defined with different roles or attributes",
                self.name
            )));
        }
        Ok(())
    }
}

// ── Rules ────────────────────────────────────────────────────────

/// A when/then rule as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub when: String,
    pub then: String,
}

/// A rule as registered with the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub name: String,
    pub when: String,
    pub then: String,
    /// The backend statement the rule compiled to.
    pub compiled: String,
    pub defined_at: DateTime<Utc>,
}

// ── Snapshot ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Incremented on every committed mutation; used to detect concurrent writers.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub entity_map: BTreeMap<String, EntityTypeDescriptor>,
    #[serde(default)]
    pub rel_map: BTreeMap<String, RelationshipTypeDescriptor>,
    #[serde(default)]
    pub rules_map: BTreeMap<String, RuleResult>,
    /// BLAKE3 over version and maps, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Hashable view of a snapshot (excludes checksum and timestamp).
#[derive(Serialize)]
struct HashableSnapshot<'a> {
    version: u64,
    entity_map: &'a BTreeMap<String, EntityTypeDescriptor>,
    rel_map: &'a BTreeMap<String, RelationshipTypeDescriptor>,
    rules_map: &'a BTreeMap<String, RuleResult>,
}

impl Snapshot {
    pub fn cache_key(namespace: &str) -> String {
        format!("{CACHE_KEY_PREFIX}{namespace}")
    }

    pub fn compute_checksum(&self) -> Result<String> {
        let hashable = HashableSnapshot {
            version: self.version,
            entity_map: &self.entity_map,
            rel_map: &self.rel_map,
            rules_map: &self.rules_map,
        };
        let json = serde_json::to_vec(&hashable)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }

    /// Stamp the checksum so the snapshot can be verified when read back.
    pub fn seal(&mut self) -> Result<()> {
        self.checksum = Some(self.compute_checksum()?);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a cached snapshot, verifying its checksum when one is present.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        if let Some(stored) = &snapshot.checksum {
            if stored != &snapshot.compute_checksum()? {
                return Err(CodexError::Serialization(
                    "snapshot checksum does not match its content".to_string(),
                ));
            }
        }
        Ok(snapshot)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityTypeDescriptor> {
        self.entity_map.get(name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipTypeDescriptor> {
        self.rel_map.get(name)
    }

    /// Like [`Snapshot::entity`], but a missing type is a schema error.
    pub fn require_entity(&self, name: &str) -> Result<&EntityTypeDescriptor> {
        self.entity(name)
            .ok_or_else(|| CodexError::Schema(format!("missing entity type: {name}")))
    }

    pub fn require_relationship(&self, name: &str) -> Result<&RelationshipTypeDescriptor> {
        self.relationship(name)
            .ok_or_else(|| CodexError::Schema(format!("missing relationship type: {name}")))
    }
}
