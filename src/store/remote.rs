use nebbler_observer::{ChangeBatch, ChangeOperation, TableChange};
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, trace};

use super::LocalStore;
use super::write::{Statement, bind_all};
use crate::schema::Table;
use crate::{Error, Result};

/// A row change delivered by the replication stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
   /// Insert or replace the row with these column values. Must contain `id`.
   Upsert {
      table: Table,
      row: Map<String, JsonValue>,
   },
   /// Remove the row.
   Delete { table: Table, id: String },
}

impl RemoteChange {
   fn table(&self) -> Table {
      match self {
         RemoteChange::Upsert { table, .. } | RemoteChange::Delete { table, .. } => *table,
      }
   }

   fn to_statement(&self) -> Result<(Statement, String)> {
      match self {
         RemoteChange::Upsert { table, row } => {
            let id = row
               .get("id")
               .and_then(JsonValue::as_str)
               .ok_or_else(|| Error::validation(format!("{} row without a string id", table.name())))?
               .to_string();

            let mut columns = vec!["id"];
            let mut values = vec![json!(id)];
            for (column, value) in row {
               if column == "id" {
                  continue;
               }
               match table.columns().iter().find(|c| **c == column.as_str()) {
                  Some(known) => {
                     columns.push(*known);
                     values.push(value.clone());
                  }
                  None => trace!(table = table.name(), column = %column, "Ignoring unknown replicated column"),
               }
            }

            let placeholders = vec!["?"; columns.len()].join(", ");
            let conflict = if columns.len() == 1 {
               "DO NOTHING".to_string()
            } else {
               let assignments = columns[1..]
                  .iter()
                  .map(|c| format!("{c} = excluded.{c}"))
                  .collect::<Vec<_>>()
                  .join(", ");
               format!("DO UPDATE SET {assignments}")
            };

            let query = format!(
               "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT(id) {conflict}",
               table.name(),
               columns.join(", ")
            );
            Ok((Statement::new(query, values), id))
         }
         RemoteChange::Delete { table, id } => Ok((
            Statement::new(format!("DELETE FROM {} WHERE id = ?", table.name()), vec![json!(id)]),
            id.clone(),
         )),
      }
   }
}

impl LocalStore {
   /// Apply server-side row changes in one transaction.
   ///
   /// Replicated changes are not queued for upload. Observers are notified
   /// after commit, exactly like local writes.
   pub async fn apply_remote(&self, changes: Vec<RemoteChange>) -> Result<usize> {
      if changes.is_empty() {
         return Ok(0);
      }

      let mut statements = Vec::with_capacity(changes.len());
      let mut batch = ChangeBatch::new();
      for change in &changes {
         let (statement, id) = change.to_statement()?;
         let operation = match change {
            RemoteChange::Upsert { .. } => ChangeOperation::Update,
            RemoteChange::Delete { .. } => ChangeOperation::Delete,
         };
         batch.push(TableChange::new(change.table().name(), operation, Some(id)));
         statements.push(statement);
      }

      let mut writer = self.db.acquire_writer().await?;
      super::begin_immediate(&mut writer).await?;

      let result = async {
         for statement in &statements {
            bind_all(statement).execute(&mut *writer).await?;
         }
         Ok::<(), Error>(())
      }
      .await;

      super::finish_transaction(&mut writer, result).await?;
      drop(writer);

      debug!(changes = statements.len(), "Applied replicated changes");
      self.broker.publish(batch);
      Ok(statements.len())
   }
}
