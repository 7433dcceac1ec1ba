//! Reactive query layer.
//!
//! A [`Query`] is SQL plus parameters plus the tables it reads. Turning it
//! into a [`LiveQuery`] subscribes to committed changes on those tables and
//! re-runs the query after each one, so consumers always see a snapshot that
//! reflects the latest commit.

mod catalog;
mod events;

use std::fmt;
use std::marker::PhantomData;

use futures::{FutureExt, Stream, StreamExt};
use nebbler_observer::{TableChangeEvent, TableChangeStream};
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use tracing::trace;

use crate::decode::from_row;
use crate::schema::Table;
use crate::store::{LocalStore, Statement};
use crate::{Error, Result};

pub use catalog::*;
pub use events::{DateMarker, EVENT_DOT_COLOR, events_in_range, marked_dates};

/// A typed query over the local store.
pub struct Query<T> {
   statement: Statement,
   tables: Vec<Table>,
   _row: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
   fn clone(&self) -> Self {
      Self {
         statement: self.statement.clone(),
         tables: self.tables.clone(),
         _row: PhantomData,
      }
   }
}

impl<T> fmt::Debug for Query<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Query")
         .field("sql", &self.statement.query)
         .field("params", &self.statement.values)
         .field("tables", &self.tables)
         .finish()
   }
}

impl<T: DeserializeOwned> Query<T> {
   pub fn new(sql: impl Into<String>, params: Vec<JsonValue>, tables: Vec<Table>) -> Self {
      Self {
         statement: Statement::new(sql, params),
         tables,
         _row: PhantomData,
      }
   }

   /// Query keyed by an optional id.
   ///
   /// With no id the query is replaced by one that matches nothing, so a
   /// screen can subscribe before it knows what it is looking at.
   pub fn scoped(table: Table, sql: &str, scope: Option<&str>) -> Self {
      match scope {
         Some(id) => Self::new(sql, vec![json!(id)], vec![table]),
         None => Self::new(format!("SELECT * FROM {} WHERE 0", table.name()), Vec::new(), vec![table]),
      }
   }

   pub fn sql(&self) -> &str {
      &self.statement.query
   }

   pub fn params(&self) -> &[JsonValue] {
      &self.statement.values
   }

   pub fn tables(&self) -> &[Table] {
      &self.tables
   }

   pub async fn fetch(&self, store: &LocalStore) -> Result<Vec<T>> {
      store
         .fetch_all(&self.statement)
         .await?
         .into_iter()
         .map(from_row)
         .collect()
   }

   pub async fn fetch_optional(&self, store: &LocalStore) -> Result<Option<T>> {
      let mut rows = self.fetch(store).await?;
      match rows.len() {
         0 | 1 => Ok(rows.pop()),
         count => Err(Error::MultipleRowsReturned(count)),
      }
   }

   /// Subscribe to the query's tables. The subscription starts now, so no
   /// commit after this call is missed.
   pub fn watch(self, store: &LocalStore) -> LiveQuery<T> {
      let changes = store.subscribe(&self.tables);
      LiveQuery {
         store: store.clone(),
         query: self,
         changes,
      }
   }
}

/// A query that re-runs whenever one of its tables changes.
pub struct LiveQuery<T> {
   store: LocalStore,
   query: Query<T>,
   changes: TableChangeStream,
}

impl<T: DeserializeOwned> LiveQuery<T> {
   pub fn query(&self) -> &Query<T> {
      &self.query
   }

   /// Run the query against the current committed state.
   pub async fn current(&self) -> Result<Vec<T>> {
      self.query.fetch(&self.store).await
   }

   /// Wait for the next committed change and return the fresh result.
   ///
   /// Changes already queued are folded into one re-run. Returns `None`
   /// once the store is gone.
   pub async fn changed(&mut self) -> Option<Result<Vec<T>>> {
      let event = self.changes.next().await?;
      match &event {
         TableChangeEvent::Change(change) => trace!(table = %change.table, "Live query invalidated"),
         TableChangeEvent::Lagged(missed) => trace!(missed, "Live query lagged, re-running"),
      }

      while let Some(Some(_)) = self.changes.next().now_or_never() {}

      Some(self.current().await)
   }

   /// Stream of results: the current snapshot, then one per change.
   pub fn into_stream(self) -> impl Stream<Item = Result<Vec<T>>> {
      futures::stream::unfold((self, true), |(mut live, first)| async move {
         let result = if first {
            live.current().await
         } else {
            live.changed().await?
         };
         Some((result, (live, false)))
      })
   }
}
