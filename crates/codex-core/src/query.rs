//! Structured query descriptors.
//!
//! Filters are written as parallel lists of attribute names, comparator strings,
//! and literal values, one predicate per index. Descriptors deserialise from
//! JSON tagged by `action`:
//!
//! ```
//! # use codex_core::QueryDescriptor;
//! let q: QueryDescriptor = serde_json::from_str(r#"{
//!     "action": "Find",
//!     "concept": "Company",
//!     "concept_attrs": ["name"],
//!     "concept_conds": ["equals"],
//!     "concept_values": ["Google"]
//! }"#).unwrap();
//! assert!(q.validate().is_ok());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CodexError, Result};
use crate::schema::{Rule, RuleResult};
use crate::types::{AttributeType, Table, Value};

// ── Comparators ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Equals,
    GreaterOrEqual,
    Greater,
    Less,
    LessOrEqual,
    Contains,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::GreaterOrEqual => ">=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Contains => "contains",
        }
    }

    /// The Cypher operator this comparator translates to.
    pub fn cypher_operator(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::GreaterOrEqual => ">=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Contains => "CONTAINS",
        }
    }

    /// Compatibility table: equality works on every type, substring match on
    /// strings only, ordering on numbers only.
    pub fn supports(&self, value_type: AttributeType) -> bool {
        match self {
            Self::Equals => true,
            Self::Contains => value_type == AttributeType::String,
            Self::GreaterOrEqual | Self::Greater | Self::Less | Self::LessOrEqual => {
                value_type.is_numeric()
            }
        }
    }
}

impl FromStr for Comparator {
    type Err = CodexError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        match normalized.as_str() {
            "equals" | "equal" | "eq" | "==" | "=" => Ok(Self::Equals),
            ">=" | "gte" | "greater than or equal" | "greater than or equal to" => {
                Ok(Self::GreaterOrEqual)
            }
            ">" | "gt" | "greater than" => Ok(Self::Greater),
            "<" | "lt" | "less than" => Ok(Self::Less),
            "<=" | "lte" | "less than or equal" | "less than or equal to" => {
                Ok(Self::LessOrEqual)
            }
            "contains" => Ok(Self::Contains),
            _ => Err(CodexError::Validation(format!("unknown comparator: {s}"))),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed `(attribute, comparator, literal)` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub attribute: String,
    pub comparator: Comparator,
    pub value: Value,
}

/// Zip parallel filter lists into predicates. Mismatched lengths and unknown
/// comparators are caller errors.
pub fn zip_predicates(
    section: &str,
    attrs: &[String],
    conds: &[String],
    values: &[Value],
) -> Result<Vec<Predicate>> {
    if attrs.len() != conds.len() || attrs.len() != values.len() {
        return Err(CodexError::Validation(format!(
            "{section}: {} attributes, {} conditions and {} values must have equal length",
            attrs.len(),
            conds.len(),
            values.len()
        )));
    }

    attrs
        .iter()
        .zip(conds)
        .zip(values)
        .map(|((attribute, cond), value)| {
            if value.is_null() {
                return Err(CodexError::Validation(format!(
                    "{section}: null literal for attribute {attribute}"
                )));
            }
            Ok(Predicate {
                attribute: attribute.clone(),
                comparator: cond.parse()?,
                value: value.clone(),
            })
        })
        .collect()
}

// ── Find ─────────────────────────────────────────────────────────

/// Match instances of `concept`, optionally through one relationship traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindQuery {
    pub concept: String,
    pub concept_attrs: Vec<String>,
    pub concept_conds: Vec<String>,
    pub concept_values: Vec<Value>,
    /// Relationship type to traverse.
    pub rel_action: Option<String>,
    /// Entity type at the other end of the traversal.
    pub concept_rels: Option<String>,
    pub concept_rel_attrs: Vec<String>,
    pub concept_rel_conds: Vec<String>,
    pub concept_rel_values: Vec<Value>,
    pub with_rel_attrs: Vec<String>,
    pub with_rel_conds: Vec<String>,
    pub with_rel_values: Vec<Value>,
}

impl FindQuery {
    pub fn new(concept: &str) -> Self {
        Self {
            concept: concept.to_string(),
            ..Default::default()
        }
    }

    /// Filter the concept's own attributes.
    pub fn filter(mut self, attr: &str, cond: Comparator, value: impl Into<Value>) -> Self {
        self.concept_attrs.push(attr.to_string());
        self.concept_conds.push(cond.as_str().to_string());
        self.concept_values.push(value.into());
        self
    }

    pub fn traverse(mut self, relationship: &str, counterpart: &str) -> Self {
        self.rel_action = Some(relationship.to_string());
        self.concept_rels = Some(counterpart.to_string());
        self
    }

    /// Filter the counterpart entity reached by the traversal.
    pub fn filter_related(mut self, attr: &str, cond: Comparator, value: impl Into<Value>) -> Self {
        self.concept_rel_attrs.push(attr.to_string());
        self.concept_rel_conds.push(cond.as_str().to_string());
        self.concept_rel_values.push(value.into());
        self
    }

    /// Filter the traversed relationship instance's own attributes.
    pub fn filter_relationship(
        mut self,
        attr: &str,
        cond: Comparator,
        value: impl Into<Value>,
    ) -> Self {
        self.with_rel_attrs.push(attr.to_string());
        self.with_rel_conds.push(cond.as_str().to_string());
        self.with_rel_values.push(value.into());
        self
    }

    pub fn concept_predicates(&self) -> Result<Vec<Predicate>> {
        zip_predicates(
            "concept",
            &self.concept_attrs,
            &self.concept_conds,
            &self.concept_values,
        )
    }

    pub fn related_predicates(&self) -> Result<Vec<Predicate>> {
        zip_predicates(
            "concept_rel",
            &self.concept_rel_attrs,
            &self.concept_rel_conds,
            &self.concept_rel_values,
        )
    }

    pub fn relationship_predicates(&self) -> Result<Vec<Predicate>> {
        zip_predicates(
            "with_rel",
            &self.with_rel_attrs,
            &self.with_rel_conds,
            &self.with_rel_values,
        )
    }

    fn validate(&self) -> Result<()> {
        if self.concept.is_empty() {
            return Err(CodexError::Validation("find: concept is required".into()));
        }
        self.concept_predicates()?;
        let related = self.related_predicates()?;
        let relationship = self.relationship_predicates()?;
        if self.rel_action.is_none()
            && (self.concept_rels.is_some() || !related.is_empty() || !relationship.is_empty())
        {
            return Err(CodexError::Validation(
                "find: traversal filters require rel_action".into(),
            ));
        }
        Ok(())
    }
}

// ── Compute ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeOp {
    Count,
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Std,
}

impl ComputeOp {
    pub fn requires_attribute(&self) -> bool {
        !matches!(self, Self::Count)
    }

    pub fn requires_numeric(&self) -> bool {
        matches!(self, Self::Sum | Self::Mean | Self::Median | Self::Std)
    }

    /// Wrap `expr` in the matching Cypher aggregate.
    pub fn aggregate(&self, expr: &str) -> String {
        match self {
            Self::Count => format!("count({expr})"),
            Self::Sum => format!("sum({expr})"),
            Self::Mean => format!("avg({expr})"),
            Self::Median => format!("percentileCont({expr}, 0.5)"),
            Self::Min => format!("min({expr})"),
            Self::Max => format!("max({expr})"),
            Self::Std => format!("stDev({expr})"),
        }
    }
}

/// Aggregate one attribute of a concept (or count its instances).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeQuery {
    pub op: ComputeOp,
    pub concept: String,
    #[serde(default)]
    pub attr: Option<String>,
    #[serde(default)]
    pub concept_attrs: Vec<String>,
    #[serde(default)]
    pub concept_conds: Vec<String>,
    #[serde(default)]
    pub concept_values: Vec<Value>,
}

impl ComputeQuery {
    pub fn new(op: ComputeOp, concept: &str, attr: Option<&str>) -> Self {
        Self {
            op,
            concept: concept.to_string(),
            attr: attr.map(str::to_string),
            concept_attrs: Vec::new(),
            concept_conds: Vec::new(),
            concept_values: Vec::new(),
        }
    }

    pub fn filter(mut self, attr: &str, cond: Comparator, value: impl Into<Value>) -> Self {
        self.concept_attrs.push(attr.to_string());
        self.concept_conds.push(cond.as_str().to_string());
        self.concept_values.push(value.into());
        self
    }

    pub fn predicates(&self) -> Result<Vec<Predicate>> {
        zip_predicates(
            "compute",
            &self.concept_attrs,
            &self.concept_conds,
            &self.concept_values,
        )
    }

    fn validate(&self) -> Result<()> {
        if self.concept.is_empty() {
            return Err(CodexError::Validation("compute: concept is required".into()));
        }
        if self.op.requires_attribute() && self.attr.is_none() {
            return Err(CodexError::Validation(format!(
                "compute: {:?} requires an attribute",
                self.op
            )));
        }
        self.predicates()?;
        Ok(())
    }
}

// ── Rule / Cluster ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleQuery {
    pub rule: Rule,
}

/// Connected components over relationship instances among `concepts`.
/// An empty `relationships` list means every relationship between them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterQuery {
    pub concepts: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<String>,
}

// ── Descriptor / Result ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum QueryDescriptor {
    Find(FindQuery),
    Compute(ComputeQuery),
    Rule(RuleQuery),
    Cluster(ClusterQuery),
}

impl QueryDescriptor {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Find(_) => "Find",
            Self::Compute(_) => "Compute",
            Self::Rule(_) => "Rule",
            Self::Cluster(_) => "Cluster",
        }
    }

    /// Structural checks that need no schema: list lengths, comparators,
    /// required fields.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Find(q) => q.validate(),
            Self::Compute(q) => q.validate(),
            Self::Rule(q) => {
                let rule = &q.rule;
                if rule.name.is_empty() || rule.when.trim().is_empty() || rule.then.trim().is_empty()
                {
                    return Err(CodexError::Validation(
                        "rule: name, when and then are required".into(),
                    ));
                }
                Ok(())
            }
            Self::Cluster(q) => {
                if q.concepts.is_empty() {
                    return Err(CodexError::Validation(
                        "cluster: at least one concept is required".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "result")]
pub enum QueryResult {
    /// Matched rows grouped by entity type name.
    Find(BTreeMap<String, Table>),
    Compute(Value),
    Rule(RuleResult),
    Cluster(Table),
}
