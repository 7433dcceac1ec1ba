//! Mutation layer: every local write to the entity tables.
//!
//! Each operation stamps its rows, generates ids up front and submits one
//! atomic unit to the [`LocalStore`]. Multi-row creations (a calendar with
//! its owner's membership, a group with its owner) either land completely or
//! not at all.

mod calendar_groups;
mod calendar_members;
mod calendars;
mod event_responses;
mod events;
mod update;
mod users;

use tracing::debug;

use crate::schema::{DeletePolicy, Table};
use crate::store::{LocalStore, RowWrite};
use crate::timestamp;
use crate::Result;

pub use calendar_groups::CalendarGroupUpdate;
pub use calendar_members::CalendarMemberUpdate;
pub use calendars::{CalendarDefaults, CalendarUpdate, DEFAULT_VIEW_MODE, NewCalendar};
pub use events::{EventUpdate, NewEvent};
pub use users::{NewUser, UserUpdate};

pub(crate) use update::UpdateBuilder;

/// Entry point for local writes.
#[derive(Clone)]
pub struct Mutations {
   store: LocalStore,
}

impl Mutations {
   pub fn new(store: LocalStore) -> Self {
      Self { store }
   }

   pub fn store(&self) -> &LocalStore {
      &self.store
   }

   /// Submit a unit of row writes.
   async fn commit(&self, writes: Vec<RowWrite>) -> Result<()> {
      self.store.write(writes).await?;
      Ok(())
   }

   /// Submit a partial update. Returns `false`, without touching the store,
   /// when nothing was supplied.
   async fn apply_update(&self, builder: UpdateBuilder, id: &str) -> Result<bool> {
      match builder.build(id, &timestamp::now()) {
         Some(write) => {
            self.commit(vec![write]).await?;
            Ok(true)
         }
         None => {
            debug!(id, "Empty update skipped");
            Ok(false)
         }
      }
   }

   /// Delete following the table's policy.
   async fn delete(&self, table: Table, id: &str) -> Result<()> {
      let write = match table.delete_policy() {
         DeletePolicy::Soft => RowWrite::soft_delete(table, id, &timestamp::now()),
         DeletePolicy::Hard => RowWrite::hard_delete(table, id),
      };
      self.commit(vec![write]).await
   }
}

/// Reject blank required text.
fn require_text(field: &str, value: &str) -> Result<()> {
   if value.trim().is_empty() {
      return Err(crate::Error::validation(format!("{field} must not be empty")));
   }
   Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
   use serde_json::json;
   use tempfile::TempDir;

   use super::Mutations;
   use crate::store::{LocalStore, Statement};

   pub(crate) async fn create_test_mutations() -> (Mutations, TempDir) {
      let temp_dir = TempDir::new().expect("Failed to create temp directory");
      let store = LocalStore::open(temp_dir.path().join("test.db"), None)
         .await
         .expect("Failed to open store");
      (Mutations::new(store), temp_dir)
   }

   pub(crate) async fn scalar(mutations: &Mutations, sql: &str, values: Vec<serde_json::Value>) -> serde_json::Value {
      let row = mutations
         .store()
         .fetch_optional(&Statement::new(sql, values))
         .await
         .unwrap()
         .unwrap_or_default();
      row.get_index(0).map(|(_, v)| v.clone()).unwrap_or(json!(null))
   }
}
