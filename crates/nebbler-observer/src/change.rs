use std::time::Instant;

/// Kind of row-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOperation {
   Insert,
   Update,
   Delete,
}

/// Notification of a committed change to a table.
///
/// Only sent after the enclosing transaction commits; rolled-back writes
/// never produce a notification.
#[derive(Debug, Clone)]
pub struct TableChange {
   pub table: String,
   pub operation: ChangeOperation,
   /// Primary key of the affected row, when the writer knows it.
   pub row_id: Option<String>,
   pub timestamp: Instant,
}

impl TableChange {
   pub fn new(table: impl Into<String>, operation: ChangeOperation, row_id: Option<String>) -> Self {
      Self {
         table: table.into(),
         operation,
         row_id,
         timestamp: Instant::now(),
      }
   }
}

/// Item yielded by [`TableChangeStream`](crate::TableChangeStream).
#[derive(Debug, Clone)]
pub enum TableChangeEvent {
   /// A committed change.
   Change(TableChange),
   /// The subscriber fell behind and missed this many notifications.
   ///
   /// Consumers holding derived state should treat this as "anything may
   /// have changed" and refresh.
   Lagged(u64),
}
