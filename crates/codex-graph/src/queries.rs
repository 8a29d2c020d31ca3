//! Query execution and row conversion.

use crate::client::{GraphError, Neo4jSession};
use crate::store::{CompiledQuery, Record};

impl Neo4jSession {
    /// Run a read statement and convert every row into a [`Record`].
    pub(crate) async fn read_records(
        &self,
        compiled: &CompiledQuery,
    ) -> Result<Vec<Record>, GraphError> {
        let rows = self.rows(self.bind(compiled)).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row_to_record(&row)?);
        }
        tracing::debug!(keyspace = %self.keyspace, rows = records.len(), "Read query complete");
        Ok(records)
    }

    /// Run a write statement in an explicit transaction. Writes return no rows.
    pub(crate) async fn write_records(
        &self,
        compiled: &CompiledQuery,
    ) -> Result<Vec<Record>, GraphError> {
        self.run_in_txn([self.bind(compiled)]).await?;
        tracing::debug!(keyspace = %self.keyspace, "Write query committed");
        Ok(Vec::new())
    }

    pub(crate) async fn keyspace_names(&self) -> Result<Vec<String>, GraphError> {
        let rows = self
            .rows(neo4rs::query(
                "MATCH (k:CodexKeyspace)
                 RETURN k.name AS name
                 ORDER BY name",
            ))
            .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get("name").map_err(|e| {
                GraphError::Serialization(format!("Failed to read keyspace name: {e}"))
            })?;
            names.push(name);
        }
        Ok(names)
    }
}

/// Convert a neo4rs row into a column-keyed JSON record.
fn row_to_record(row: &neo4rs::Row) -> Result<Record, GraphError> {
    row.to::<Record>()
        .map_err(|e| GraphError::Serialization(format!("Failed to deserialize row: {e}")))
}
