//! Tabular values and attribute typing.
//!
//! Tables are the exchange format on both sides of the mapping layer: loaders
//! take them as input and find queries return them grouped by concept.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CodexError, Result};

// ── Values ───────────────────────────────────────────────────────

/// A single table cell.
///
/// Deserialises from plain JSON scalars, so a table can be written by hand:
/// `{"columns": ["name", "budget"], "rows": [["Google", 999.99]]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The narrowest attribute type that can hold this value.
    pub fn attribute_type(&self) -> Option<AttributeType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(AttributeType::Boolean),
            Self::Long(_) => Some(AttributeType::Long),
            Self::Double(_) => Some(AttributeType::Double),
            Self::String(_) => Some(AttributeType::String),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Long(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert this value so it can be stored in an attribute of type `target`.
    ///
    /// Returns `None` when no lossless conversion exists. Nulls pass through.
    pub fn coerce(&self, target: AttributeType) -> Option<Value> {
        match (target, self) {
            (_, Self::Null) => Some(Self::Null),
            (AttributeType::Long, Self::Long(v)) => Some(Self::Long(*v)),
            (AttributeType::Long, Self::Double(v)) => whole_long(*v).map(Self::Long),
            (AttributeType::Long, Self::String(s)) => s.trim().parse().ok().map(Self::Long),
            (AttributeType::Double, Self::Long(v)) => Some(Self::Double(*v as f64)),
            (AttributeType::Double, Self::Double(v)) if v.is_finite() => Some(Self::Double(*v)),
            (AttributeType::Double, Self::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Self::Double),
            (AttributeType::Boolean, Self::Boolean(b)) => Some(Self::Boolean(*b)),
            (AttributeType::Boolean, Self::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" => Some(Self::Boolean(true)),
                "false" => Some(Self::Boolean(false)),
                _ => None,
            },
            (AttributeType::String, Self::String(s)) => Some(Self::String(s.clone())),
            (AttributeType::String, other) => Some(Self::String(other.to_string())),
            _ => None,
        }
    }

    /// Lift a JSON value returned by the graph store. Composite values are kept
    /// as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Long(i),
                None => Self::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }
}

/// `v` as an `i64` when it is a whole number inside the `i64` range.
fn whole_long(v: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    let in_range = v >= i64::MIN as f64 && v < i64::MAX as f64;
    (in_range && v.fract() == 0.0).then_some(v as i64)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Long(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

// ── Attribute Types ──────────────────────────────────────────────

/// Value type of a graph attribute, inferred from a column's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Long,
    Double,
    Boolean,
    String,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// Infer the attribute type of a column.
    ///
    /// Integers widen to doubles when mixed with floats; any other mix, and a
    /// column with no non-null values, falls back to string.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut inferred: Option<Self> = None;
        for ty in values.into_iter().filter_map(Value::attribute_type) {
            inferred = Some(match (inferred, ty) {
                (None, ty) => ty,
                (Some(prev), ty) if prev == ty => prev,
                (Some(Self::Long), Self::Double) | (Some(Self::Double), Self::Long) => {
                    Self::Double
                }
                _ => return Self::String,
            });
        }
        inferred.unwrap_or(Self::String)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tables ───────────────────────────────────────────────────────

/// Column-named rows of values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, rejecting rows whose width differs from the header.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(CodexError::Validation(format!(
                "row has {} values but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate the values of column `index`.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// Cell lookup by row number and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Check header and row shape. Tables built with [`Table::push_row`] are
    /// always well-formed; deserialised ones may not be.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.is_empty() {
                return Err(CodexError::Validation("empty column name".to_string()));
            }
            if !seen.insert(column.as_str()) {
                return Err(CodexError::Validation(format!(
                    "duplicate column name: {column}"
                )));
            }
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(CodexError::Validation(format!(
                    "row {i} has {} values but the table has {} columns",
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        Ok(())
    }
}
