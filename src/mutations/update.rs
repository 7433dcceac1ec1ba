use serde_json::Value as JsonValue;

use crate::schema::Table;
use crate::store::RowWrite;

/// Accumulates the columns a partial update actually changes.
///
/// Only supplied values become assignments. `updated_at` is appended by
/// [`UpdateBuilder::build`], so an update that supplies nothing builds to
/// `None` and never reaches the store.
#[derive(Debug)]
pub(crate) struct UpdateBuilder {
   table: Table,
   assignments: Vec<(&'static str, JsonValue)>,
}

impl UpdateBuilder {
   pub(crate) fn new(table: Table) -> Self {
      Self {
         table,
         assignments: Vec::new(),
      }
   }

   /// Always assign `column`.
   pub(crate) fn set(mut self, column: &'static str, value: impl Into<JsonValue>) -> Self {
      debug_assert!(
         self.table.has_column(column),
         "{} has no column {column}",
         self.table.name()
      );
      self.assignments.push((column, value.into()));
      self
   }

   /// Assign `column` when a value was supplied.
   pub(crate) fn set_opt<V: Into<JsonValue>>(self, column: &'static str, value: Option<V>) -> Self {
      match value {
         Some(value) => self.set(column, value),
         None => self,
      }
   }

   /// Assign a nullable column: outer `None` leaves it alone, `Some(None)` clears it.
   pub(crate) fn set_nullable<V: Into<JsonValue>>(
      self,
      column: &'static str,
      value: Option<Option<V>>,
   ) -> Self {
      match value {
         Some(Some(value)) => self.set(column, value),
         Some(None) => self.set(column, JsonValue::Null),
         None => self,
      }
   }

   pub(crate) fn is_empty(&self) -> bool {
      self.assignments.is_empty()
   }

   /// Finish the update of row `id`, stamping `updated_at` with `now`.
   pub(crate) fn build(self, id: &str, now: &str) -> Option<RowWrite> {
      if self.is_empty() {
         return None;
      }
      let table = self.table;
      let builder = self.set("updated_at", now);
      Some(RowWrite::update(table, id, builder.assignments))
   }
}
