use std::ops::{Deref, DerefMut};

use sqlx::Sqlite;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteConnection;
use tracing::trace;

/// RAII guard for exclusive write access to the database.
///
/// Holds the only connection of the write pool. Dropping the guard returns
/// the connection to the pool; a transaction that was begun but neither
/// committed nor rolled back is rolled back by SQLx when the connection is
/// reset.
#[must_use = "if unused, the write lock is immediately released"]
#[derive(Debug)]
pub struct WriteGuard {
   conn: PoolConnection<Sqlite>,
}

impl WriteGuard {
   pub(crate) fn new(conn: PoolConnection<Sqlite>) -> Self {
      trace!("Write connection acquired");
      Self { conn }
   }
}

impl Deref for WriteGuard {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      &self.conn
   }
}

impl DerefMut for WriteGuard {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.conn
   }
}

impl Drop for WriteGuard {
   fn drop(&mut self) {
      trace!("Write connection released");
   }
}
