//! Queued local changes awaiting upload.
//!
//! Every committed local mutation leaves one change-set in the queue holding
//! its row operations in statement order. The upload bridge drains
//! change-sets oldest first and acknowledges one only after every entry in
//! it has been accepted by the backend.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use crate::connector::HttpMethod;
use crate::{Error, Result};

/// Kind of row operation recorded in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
   /// Row created. `op_data` holds every uploaded column.
   Put,
   /// Row changed. `op_data` holds only the changed columns.
   Patch,
   /// Row removed. No payload.
   Delete,
}

impl UpdateType {
   pub fn as_str(self) -> &'static str {
      match self {
         UpdateType::Put => "PUT",
         UpdateType::Patch => "PATCH",
         UpdateType::Delete => "DELETE",
      }
   }

   pub fn http_method(self) -> HttpMethod {
      match self {
         UpdateType::Put => HttpMethod::Put,
         UpdateType::Patch => HttpMethod::Patch,
         UpdateType::Delete => HttpMethod::Delete,
      }
   }
}

impl fmt::Display for UpdateType {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

impl FromStr for UpdateType {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self> {
      match s {
         "PUT" => Ok(UpdateType::Put),
         "PATCH" => Ok(UpdateType::Patch),
         "DELETE" => Ok(UpdateType::Delete),
         other => Err(Error::validation(format!("unknown queued operation '{other}'"))),
      }
   }
}

/// One queued row operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CrudEntry {
   pub op: UpdateType,
   pub table: String,
   pub id: String,
   pub op_data: Option<Map<String, JsonValue>>,
}

/// A queued change-set: the row operations of one committed local transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CrudTransaction {
   pub id: i64,
   pub crud: Vec<CrudEntry>,
}

/// Source of queued change-sets for the upload bridge.
#[async_trait]
pub trait CrudSource: Send + Sync {
   /// Oldest pending change-set, if any.
   async fn next_crud_transaction(&self) -> Result<Option<CrudTransaction>>;

   /// Acknowledge a change-set, removing it from the queue.
   async fn complete_transaction(&self, transaction_id: i64) -> Result<()>;
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_update_type_round_trip() {
      for op in [UpdateType::Put, UpdateType::Patch, UpdateType::Delete] {
         assert_eq!(op.as_str().parse::<UpdateType>().unwrap(), op);
      }
      assert!(matches!("UPSERT".parse::<UpdateType>(), Err(Error::Validation(_))));
   }

   #[test]
   fn test_update_type_http_method() {
      assert_eq!(UpdateType::Put.http_method(), HttpMethod::Put);
      assert_eq!(UpdateType::Patch.http_method(), HttpMethod::Patch);
      assert_eq!(UpdateType::Delete.http_method(), HttpMethod::Delete);
   }
}
