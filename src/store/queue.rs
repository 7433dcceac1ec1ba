use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use sqlx::SqliteConnection;
use tracing::{debug, trace};

use super::LocalStore;
use super::write::RowWrite;
use crate::Result;
use crate::crud::{CrudEntry, CrudSource, CrudTransaction};
use crate::timestamp;

/// Open a new change-set inside the caller's transaction.
pub(super) async fn begin_change_set(conn: &mut SqliteConnection) -> Result<i64> {
   let result = sqlx::query("INSERT INTO crud_transactions (created_at) VALUES (?)")
      .bind(timestamp::now())
      .execute(&mut *conn)
      .await?;
   Ok(result.last_insert_rowid())
}

/// Queue one row operation under change-set `tx_id`.
pub(super) async fn enqueue(conn: &mut SqliteConnection, tx_id: i64, write: &RowWrite) -> Result<()> {
   let data = match &write.op_data {
      Some(payload) => Some(serde_json::to_string(payload)?),
      None => None,
   };

   sqlx::query(
      "INSERT INTO crud_entries (tx_id, op, table_name, row_id, data) VALUES (?, ?, ?, ?, ?)",
   )
   .bind(tx_id)
   .bind(write.kind.update_type().as_str())
   .bind(write.table.name())
   .bind(write.row_id.as_str())
   .bind(data)
   .execute(&mut *conn)
   .await?;

   trace!(tx_id, table = write.table.name(), row_id = %write.row_id, "Queued upload entry");
   Ok(())
}

impl LocalStore {
   /// Number of change-sets waiting for upload.
   pub async fn pending_transaction_count(&self) -> Result<i64> {
      let pool = self.db.read_pool()?;
      let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM crud_transactions")
         .fetch_one(pool)
         .await?;
      Ok(count)
   }
}

#[async_trait]
impl CrudSource for LocalStore {
   async fn next_crud_transaction(&self) -> Result<Option<CrudTransaction>> {
      let pool = self.db.read_pool()?;

      let Some(tx_id) = sqlx::query_scalar::<_, Option<i64>>("SELECT MIN(id) FROM crud_transactions")
         .fetch_one(pool)
         .await?
      else {
         return Ok(None);
      };

      let rows = sqlx::query_as::<_, (String, String, String, Option<String>)>(
         "SELECT op, table_name, row_id, data FROM crud_entries WHERE tx_id = ? ORDER BY id",
      )
      .bind(tx_id)
      .fetch_all(pool)
      .await?;

      let mut crud = Vec::with_capacity(rows.len());
      for (op, table, id, data) in rows {
         let op_data = match data {
            Some(text) => Some(serde_json::from_str::<Map<String, JsonValue>>(&text)?),
            None => None,
         };
         crud.push(CrudEntry {
            op: op.parse()?,
            table,
            id,
            op_data,
         });
      }

      Ok(Some(CrudTransaction { id: tx_id, crud }))
   }

   async fn complete_transaction(&self, transaction_id: i64) -> Result<()> {
      let mut writer = self.db.acquire_writer().await?;
      super::begin_immediate(&mut writer).await?;

      let result = async {
         sqlx::query("DELETE FROM crud_entries WHERE tx_id = ?")
            .bind(transaction_id)
            .execute(&mut *writer)
            .await?;
         sqlx::query("DELETE FROM crud_transactions WHERE id = ?")
            .bind(transaction_id)
            .execute(&mut *writer)
            .await?;
         Ok::<(), crate::Error>(())
      }
      .await;

      super::finish_transaction(&mut writer, result).await?;
      debug!(transaction_id, "Change-set acknowledged");
      Ok(())
   }
}
