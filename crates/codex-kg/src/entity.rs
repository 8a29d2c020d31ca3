//! Entity loading: derive an entity type from a table, register it, and
//! insert one instance per row.

use codex_core::{
    AttributeDef, CodexError, Deadline, EntityTypeDescriptor, Result, Table, Value,
};
use codex_graph::GraphSession;

use crate::report::RowOutcome;

pub struct EntityLoader<'a> {
    session: &'a dyn GraphSession,
    deadline: Deadline,
}

impl<'a> EntityLoader<'a> {
    pub fn new(session: &'a dyn GraphSession, deadline: Deadline) -> Self {
        Self { session, deadline }
    }

    /// Infer one attribute per column; `key` must name a column.
    pub fn describe(table: &Table, name: &str, key: Option<&str>) -> Result<EntityTypeDescriptor> {
        EntityTypeDescriptor::from_table(name, table, key)
    }

    /// Register the attribute types, then the entity type. Stops at the first
    /// failure; definitions already made stay in place.
    pub async fn define(&self, descriptor: &EntityTypeDescriptor) -> Result<()> {
        for attr in &descriptor.attributes {
            self.deadline
                .run(
                    "define attribute",
                    self.session.define_attribute_type(&attr.name, attr.value_type),
                )
                .await?;
        }
        self.deadline
            .run(
                "define entity",
                self.session
                    .define_entity_type(&descriptor.name, descriptor.key.as_deref()),
            )
            .await
    }

    /// Insert every row as a new instance. Rows are never deduplicated.
    pub(crate) async fn insert_rows(
        &self,
        descriptor: &EntityTypeDescriptor,
        table: &Table,
    ) -> Result<RowOutcome> {
        let mut outcome = RowOutcome::default();
        for (i, row) in table.rows.iter().enumerate() {
            let result = match typed_row(&descriptor.attributes, row) {
                Ok(attrs) => {
                    self.deadline
                        .run(
                            "insert entity",
                            self.session.insert_entity(&descriptor.name, &attrs),
                        )
                        .await
                }
                Err(e) => Err(e),
            };
            outcome.record(i, result)?;
        }

        tracing::debug!(
            keyspace = %self.session.keyspace(),
            entity = %descriptor.name,
            inserted = outcome.inserted,
            failed = outcome.row_errors.len(),
            "Entity rows inserted"
        );
        Ok(outcome)
    }
}

/// Pair each cell with its attribute, converting it to the attribute's type.
pub(crate) fn typed_row(attributes: &[AttributeDef], row: &[Value]) -> Result<Vec<(String, Value)>> {
    if attributes.len() != row.len() {
        return Err(CodexError::Validation(format!(
            "row has {} values, expected {}",
            row.len(),
            attributes.len()
        )));
    }
    attributes
        .iter()
        .zip(row)
        .map(|(attr, value)| {
            let typed = value.coerce(attr.value_type).ok_or_else(|| {
                CodexError::Validation(format!(
                    "{value} is not a valid {} for attribute {}",
                    attr.value_type.as_str(),
                    attr.name
                ))
            })?;
            Ok((attr.name.clone(), typed))
        })
        .collect()
}
