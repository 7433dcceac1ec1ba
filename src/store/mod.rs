//! Transactional local store.
//!
//! All writes go through [`LocalStore::write`], which runs a unit of row
//! mutations inside one `BEGIN IMMEDIATE` transaction together with the
//! upload-queue entries they produce. Change notifications for observers are
//! collected while the transaction is open and published only after `COMMIT`.

mod queue;
mod remote;
mod write;

use std::path::Path;
use std::sync::Arc;

use nebbler_conn_mgr::{SqliteDatabase, SqliteDatabaseConfig, WriteGuard};
use nebbler_observer::{
   ChangeBatch, ChangeOperation, ObservationBroker, ObserverConfig, TableChange, TableChangeStream,
   TableChangeStreamExt,
};
use sqlx::Row;
use tracing::{debug, warn};

use crate::decode::{JsonRow, decode_rows};
use crate::schema::{self, CRUD_ENTRIES, Table};
use crate::{Error, Result};

pub use remote::RemoteChange;
pub use write::{Statement, WriteQueryResult};
pub(crate) use write::{RowWrite, bind_all};

/// Local SQLite store shared by the mutation layer, live queries and the
/// upload bridge. Cheap to clone.
#[derive(Clone)]
pub struct LocalStore {
   db: Arc<SqliteDatabase>,
   broker: Arc<ObservationBroker>,
}

impl LocalStore {
   /// Open (creating if missing) the store at `path` and ensure the schema exists.
   pub async fn open(path: impl AsRef<Path>, config: Option<SqliteDatabaseConfig>) -> Result<Self> {
      let db = SqliteDatabase::connect(path, config).await?;

      {
         let mut writer = db.acquire_writer().await?;
         schema::create_schema(&mut writer).await?;
      }

      let observed = Table::ALL
         .iter()
         .map(|t| t.name())
         .chain(std::iter::once(CRUD_ENTRIES));
      let broker = ObservationBroker::from_config(&ObserverConfig::new().with_tables(observed));

      debug!(path = %db.path().display(), "Local store opened");
      Ok(Self { db, broker })
   }

   pub fn database(&self) -> &Arc<SqliteDatabase> {
      &self.db
   }

   /// Stream of committed changes to any of `tables`.
   pub fn subscribe(&self, tables: &[Table]) -> TableChangeStream {
      self
         .broker
         .subscribe()
         .into_stream()
         .filter_tables(tables.iter().map(|t| t.name().to_string()).collect())
   }

   /// Stream that fires whenever a change-set is queued for upload.
   pub fn subscribe_queue(&self) -> TableChangeStream {
      self
         .broker
         .subscribe()
         .into_stream()
         .filter_tables(vec![CRUD_ENTRIES.to_string()])
   }

   /// Run a SELECT on the read pool.
   pub async fn fetch_all(&self, statement: &Statement) -> Result<Vec<JsonRow>> {
      let pool = self.db.read_pool()?;
      let rows = bind_all(statement).fetch_all(pool).await?;
      decode_rows(rows)
   }

   /// Run a SELECT expected to match zero or one row.
   pub async fn fetch_optional(&self, statement: &Statement) -> Result<Option<JsonRow>> {
      let mut rows = self.fetch_all(statement).await?;
      match rows.len() {
         0 | 1 => Ok(rows.pop()),
         count => Err(Error::MultipleRowsReturned(count)),
      }
   }

   /// Apply a unit of row mutations atomically.
   ///
   /// Either every row write and its queue entry commit, or nothing does and
   /// no observer is notified. A unit touching at least one row produces
   /// exactly one queued change-set.
   pub(crate) async fn write(&self, writes: Vec<RowWrite>) -> Result<Vec<WriteQueryResult>> {
      if writes.is_empty() {
         return Ok(Vec::new());
      }

      let mut writer = self.db.acquire_writer().await?;
      begin_immediate(&mut writer).await?;

      let result = async {
         let mut batch = ChangeBatch::new();
         let mut results = Vec::with_capacity(writes.len());
         let mut change_set: Option<i64> = None;

         for write in writes {
            // A guard that selects no row passes; the write then reports NotFound
            if let Some(guard) = &write.guard {
               let row = bind_all(&guard.statement).fetch_optional(&mut *writer).await?;
               if let Some(row) = row
                  && row.try_get::<Option<i64>, _>(0)?.unwrap_or(0) != 0
               {
                  return Err(Error::validation(guard.message.clone()));
               }
            }

            let exec = bind_all(&write.statement).execute(&mut *writer).await?;
            if write.require_row && exec.rows_affected() == 0 {
               return Err(Error::NotFound {
                  table: write.table.name(),
                  id: write.row_id,
               });
            }

            let tx_id = match change_set {
               Some(id) => id,
               None => {
                  let id = queue::begin_change_set(&mut writer).await?;
                  change_set = Some(id);
                  id
               }
            };
            queue::enqueue(&mut writer, tx_id, &write).await?;

            batch.push(TableChange::new(
               write.table.name(),
               write.kind.operation(),
               Some(write.row_id),
            ));
            results.push(WriteQueryResult {
               rows_affected: exec.rows_affected(),
               last_insert_id: exec.last_insert_rowid(),
            });
         }

         if let Some(tx_id) = change_set {
            batch.push(TableChange::new(
               CRUD_ENTRIES,
               ChangeOperation::Insert,
               Some(tx_id.to_string()),
            ));
         }
         Ok::<_, Error>((results, batch))
      }
      .await;

      let (results, batch) = finish_transaction(&mut writer, result).await?;
      drop(writer);

      self.broker.publish(batch);
      Ok(results)
   }

   /// Close the store. Further use fails.
   pub async fn close(&self) -> Result<()> {
      self.db.close().await?;
      Ok(())
   }

   /// Close the store and delete its files.
   pub async fn remove(&self) -> Result<()> {
      self.db.remove().await?;
      Ok(())
   }
}

/// Open a write transaction. Failing to start one is reported like any
/// other failure inside the unit.
pub(crate) async fn begin_immediate(writer: &mut WriteGuard) -> Result<()> {
   sqlx::query("BEGIN IMMEDIATE")
      .execute(&mut **writer)
      .await
      .map_err(|e| Error::Transaction(Box::new(Error::Sqlx(e))))?;
   Ok(())
}

/// Commit on success, roll back on failure.
///
/// Domain failures (`NotFound`, `Validation`) are returned as-is once rolled
/// back; anything else is wrapped in [`Error::Transaction`].
async fn finish_transaction<T>(writer: &mut WriteGuard, result: Result<T>) -> Result<T> {
   let error = match result {
      Ok(value) => match sqlx::query("COMMIT").execute(&mut **writer).await {
         Ok(_) => return Ok(value),
         Err(commit_err) => Error::Sqlx(commit_err),
      },
      Err(e) => e,
   };

   match sqlx::query("ROLLBACK").execute(&mut **writer).await {
      Ok(_) => {
         debug!(error = %error, "Transaction rolled back");
         Err(match error {
            Error::NotFound { .. } | Error::Validation(_) => error,
            other => Error::Transaction(Box::new(other)),
         })
      }
      Err(rollback_err) => {
         warn!(error = %error, rollback_error = %rollback_err, "Rollback failed");
         Err(Error::TransactionRollbackFailed {
            transaction_error: error.to_string(),
            rollback_error: rollback_err.to_string(),
         })
      }
   }
}
