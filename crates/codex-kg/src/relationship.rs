//! Relationship loading.
//!
//! A relationship table names its two role players in the first two columns:
//! column 0 is the role played by the first entity type and holds that type's
//! key values, column 1 likewise for the second. Remaining columns are
//! attributes of the relationship itself.

use codex_core::{
    AttributeDef, AttributeType, CodexError, Deadline, EntityTypeDescriptor,
    RelationshipTypeDescriptor, Result, RoleBinding, Table, Value,
};
use codex_graph::{GraphSession, InstanceId};

use crate::entity::typed_row;
use crate::report::RowOutcome;

pub struct RelationshipLoader<'a> {
    session: &'a dyn GraphSession,
    deadline: Deadline,
}

impl<'a> RelationshipLoader<'a> {
    pub fn new(session: &'a dyn GraphSession, deadline: Deadline) -> Self {
        Self { session, deadline }
    }

    /// Bind roles from the first two columns and infer attributes from the rest.
    /// Both entity types must declare a key, since players are found by key.
    pub fn describe(
        table: &Table,
        name: &str,
        entity1: &EntityTypeDescriptor,
        entity2: &EntityTypeDescriptor,
    ) -> Result<RelationshipTypeDescriptor> {
        table.validate()?;
        if table.width() < 2 {
            return Err(CodexError::Validation(format!(
                "relationship table for {name} needs at least two role columns, got {}",
                table.width()
            )));
        }
        for entity in [entity1, entity2] {
            if entity.key_attribute().is_none() {
                return Err(CodexError::Schema(format!(
                    "entity type {} has no key attribute and cannot play a role in {name}",
                    entity.name
                )));
            }
        }

        let attributes = (2..table.width())
            .map(|i| AttributeDef {
                name: table.columns[i].clone(),
                value_type: AttributeType::infer(table.column_values(i)),
                key: false,
            })
            .collect();

        Ok(RelationshipTypeDescriptor {
            name: name.to_string(),
            role1: RoleBinding::new(&table.columns[0], entity1),
            role2: RoleBinding::new(&table.columns[1], entity2),
            attributes,
        })
    }

    pub async fn define(&self, descriptor: &RelationshipTypeDescriptor) -> Result<()> {
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
                "define relationship",
                self.session.define_relationship_type(
                    &descriptor.name,
                    &descriptor.role1.role,
                    &descriptor.role2.role,
                ),
            )
            .await
    }

    /// Insert one relationship per row. A row whose players cannot be found
    /// is recorded and skipped.
    pub(crate) async fn insert_rows(
        &self,
        descriptor: &RelationshipTypeDescriptor,
        table: &Table,
    ) -> Result<RowOutcome> {
        let mut outcome = RowOutcome::default();
        for (i, row) in table.rows.iter().enumerate() {
            let result = self.insert_row(descriptor, row).await;
            outcome.record(i, result)?;
        }

        tracing::debug!(
            keyspace = %self.session.keyspace(),
            relationship = %descriptor.name,
            inserted = outcome.inserted,
            failed = outcome.row_errors.len(),
            "Relationship rows inserted"
        );
        Ok(outcome)
    }

    async fn insert_row(
        &self,
        descriptor: &RelationshipTypeDescriptor,
        row: &[Value],
    ) -> Result<InstanceId> {
        let (Some(first), Some(second)) = (row.first(), row.get(1)) else {
            return Err(CodexError::Validation("row is missing role player columns".into()));
        };
        let attrs = typed_row(&descriptor.attributes, &row[2..])?;
        let from = self.resolve(&descriptor.role1, first).await?;
        let to = self.resolve(&descriptor.role2, second).await?;

        self.deadline
            .run(
                "insert relationship",
                self.session.insert_relationship(
                    &descriptor.name,
                    [
                        (descriptor.role1.role.as_str(), from),
                        (descriptor.role2.role.as_str(), to),
                    ],
                    &attrs,
                ),
            )
            .await
    }

    /// Find the instance of the role's entity type whose key equals `value`.
    async fn resolve(&self, binding: &RoleBinding, value: &Value) -> Result<InstanceId> {
        let (Some(key), Some(key_type)) = (&binding.key, binding.key_type) else {
            return Err(CodexError::Schema(format!(
                "entity type {} has no key attribute",
                binding.entity
            )));
        };
        let key_value = value
            .coerce(key_type)
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                CodexError::Validation(format!(
                    "{value} is not a valid {} key for {}",
                    key_type.as_str(),
                    binding.entity
                ))
            })?;

        let found = self
            .deadline
            .run(
                "find role player",
                self.session.find_instance(&binding.entity, key, &key_value),
            )
            .await?;
        found.ok_or_else(|| CodexError::Lookup {
            entity: binding.entity.clone(),
            attribute: key.clone(),
            value: key_value.to_string(),
        })
    }
}
