use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

use nebbler_observer::ChangeOperation;

use crate::crud::UpdateType;
use crate::schema::{LOCAL_TIMESTAMP_COLUMNS, Table};

/// A SQL statement with its positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
   pub query: String,
   pub values: Vec<JsonValue>,
}

impl Statement {
   pub fn new(query: impl Into<String>, values: Vec<JsonValue>) -> Self {
      Self {
         query: query.into(),
         values,
      }
   }
}

/// Result returned from write operations (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteQueryResult {
   /// The number of rows affected by the write operation.
   pub rows_affected: u64,
   /// The last inserted row ID (SQLite ROWID).
   pub last_insert_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
   Insert,
   Update,
   SoftDelete,
   HardDelete,
}

impl WriteKind {
   pub(crate) fn operation(self) -> ChangeOperation {
      match self {
         WriteKind::Insert => ChangeOperation::Insert,
         WriteKind::Update | WriteKind::SoftDelete => ChangeOperation::Update,
         WriteKind::HardDelete => ChangeOperation::Delete,
      }
   }

   pub(crate) fn update_type(self) -> UpdateType {
      match self {
         WriteKind::Insert => UpdateType::Put,
         WriteKind::Update => UpdateType::Patch,
         WriteKind::SoftDelete | WriteKind::HardDelete => UpdateType::Delete,
      }
   }
}

/// Precondition checked inside the write transaction before the row is touched.
///
/// `query` must select a single truthy/falsy value; truthy aborts the unit.
#[derive(Debug, Clone)]
pub(crate) struct Guard {
   pub(crate) statement: Statement,
   pub(crate) message: String,
}

/// One row mutation plus the queue entry it produces.
#[derive(Debug, Clone)]
pub(crate) struct RowWrite {
   pub(crate) table: Table,
   pub(crate) row_id: String,
   pub(crate) kind: WriteKind,
   pub(crate) statement: Statement,
   pub(crate) op_data: Option<Map<String, JsonValue>>,
   /// Fail with `NotFound` when the statement matches no row.
   pub(crate) require_row: bool,
   pub(crate) guard: Option<Guard>,
}

impl RowWrite {
   /// `INSERT` of a new row. `columns` excludes `id`.
   pub(crate) fn insert(table: Table, id: &str, columns: Vec<(&'static str, JsonValue)>) -> Self {
      let mut names = vec!["id"];
      let mut values = vec![json!(id)];
      for (column, value) in &columns {
         debug_assert!(table.has_column(column), "{} has no column {column}", table.name());
         names.push(*column);
         values.push(value.clone());
      }

      let placeholders = vec!["?"; names.len()].join(", ");
      let query = format!(
         "INSERT INTO {} ({}) VALUES ({placeholders})",
         table.name(),
         names.join(", ")
      );

      Self {
         table,
         row_id: id.to_string(),
         kind: WriteKind::Insert,
         statement: Statement::new(query, values),
         op_data: Some(upload_payload(columns)),
         require_row: false,
         guard: None,
      }
   }

   /// `UPDATE` of the given columns of a live row.
   pub(crate) fn update(table: Table, id: &str, assignments: Vec<(&'static str, JsonValue)>) -> Self {
      let set = assignments
         .iter()
         .map(|(column, _)| {
            debug_assert!(table.has_column(column), "{} has no column {column}", table.name());
            format!("{column} = ?")
         })
         .collect::<Vec<_>>()
         .join(", ");

      let mut values: Vec<JsonValue> = assignments.iter().map(|(_, v)| v.clone()).collect();
      values.push(json!(id));

      let query = format!(
         "UPDATE {} SET {set} WHERE id = ? AND {}",
         table.name(),
         table.active_predicate()
      );

      Self {
         table,
         row_id: id.to_string(),
         kind: WriteKind::Update,
         statement: Statement::new(query, values),
         op_data: Some(upload_payload(assignments)),
         require_row: true,
         guard: None,
      }
   }

   /// Mark a live row deleted.
   pub(crate) fn soft_delete(table: Table, id: &str, now: &str) -> Self {
      let query = format!(
         "UPDATE {} SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
         table.name()
      );

      Self {
         table,
         row_id: id.to_string(),
         kind: WriteKind::SoftDelete,
         statement: Statement::new(query, vec![json!(now), json!(now), json!(id)]),
         op_data: None,
         require_row: true,
         guard: None,
      }
   }

   /// Remove a row outright.
   pub(crate) fn hard_delete(table: Table, id: &str) -> Self {
      let query = format!("DELETE FROM {} WHERE id = ?", table.name());

      Self {
         table,
         row_id: id.to_string(),
         kind: WriteKind::HardDelete,
         statement: Statement::new(query, vec![json!(id)]),
         op_data: None,
         require_row: true,
         guard: None,
      }
   }

   pub(crate) fn with_guard(
      mut self,
      query: impl Into<String>,
      values: Vec<JsonValue>,
      message: impl Into<String>,
   ) -> Self {
      self.guard = Some(Guard {
         statement: Statement::new(query, values),
         message: message.into(),
      });
      self
   }
}

/// Columns sent to the backend: everything except the server-owned timestamps.
fn upload_payload(columns: Vec<(&'static str, JsonValue)>) -> Map<String, JsonValue> {
   columns
      .into_iter()
      .filter(|(column, _)| !LOCAL_TIMESTAMP_COLUMNS.contains(column))
      .map(|(column, value)| (column.to_string(), value))
      .collect()
}

/// Helper function to bind a JSON value to a SQLx query
pub(crate) fn bind_value<'a>(
   query: Query<'a, Sqlite, SqliteArguments<'a>>,
   value: JsonValue,
) -> Query<'a, Sqlite, SqliteArguments<'a>> {
   match value {
      JsonValue::Null => query.bind(None::<String>),
      JsonValue::Bool(flag) => query.bind(flag),
      JsonValue::String(text) => query.bind(text),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      // Arrays and objects are stored as JSON text
      other => query.bind(other.to_string()),
   }
}

pub(crate) fn bind_all<'a>(
   statement: &'a Statement,
) -> Query<'a, Sqlite, SqliteArguments<'a>> {
   let mut query = sqlx::query(&statement.query);
   for value in &statement.values {
      query = bind_value(query, value.clone());
   }
   query
}
