//! SQLite database with a concurrent read pool and a single serialized writer

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::debug;

use crate::config::SqliteDatabaseConfig;
use crate::error::{Error, Result};
use crate::write_guard::WriteGuard;

/// SQLite database with connection pooling for concurrent reads and exclusive writes.
///
/// ## Architecture
///
/// The database maintains two connection pools:
/// - **`read_pool`**: Pool of `query_only` connections for concurrent reads
/// - **`write_conn`**: Single-connection pool for exclusive write access (enforced by max_connections=1)
///
/// ## State Management
///
/// - **`closed`**: Prevents use after the database has been closed
/// - **`path`**: Database file path for cleanup operations
///
/// ## Usage Pattern
///
/// ```text
/// 1. Connect to database (creates the file and both pools)
/// 2. Read operations: Access read_pool for concurrent reads
/// 3. Write operations: Acquire the writer, run statements, drop the guard
/// 4. Close database when done
/// ```
#[derive(Debug)]
pub struct SqliteDatabase {
   /// Pool of read-only connections for concurrent reads
   read_pool: Pool<Sqlite>,

   /// Single read-write connection pool (max_connections=1) for serialized writes
   write_conn: Pool<Sqlite>,

   /// Marks database as closed to prevent further operations
   closed: AtomicBool,

   /// Path to database file (used for cleanup)
   path: PathBuf,
}

impl SqliteDatabase {
   /// Open (creating if missing) the database at `path`.
   ///
   /// The write pool connects eagerly so the file exists and is in WAL mode
   /// before any reader opens it. Read connections are opened lazily.
   pub async fn connect(
      path: impl AsRef<Path>,
      custom_config: Option<SqliteDatabaseConfig>,
   ) -> Result<Arc<Self>> {
      let path = path.as_ref().to_path_buf();
      let config = custom_config.unwrap_or_default();

      let write_options = SqliteConnectOptions::new()
         .filename(&path)
         .create_if_missing(true)
         .journal_mode(SqliteJournalMode::Wal)
         .synchronous(SqliteSynchronous::Normal)
         .foreign_keys(true)
         .busy_timeout(config.busy_timeout);

      let write_conn = SqlitePoolOptions::new()
         .max_connections(1)
         .min_connections(0)
         .idle_timeout(Some(config.idle_timeout))
         .connect_with(write_options)
         .await?;

      let read_options = SqliteConnectOptions::new()
         .filename(&path)
         .create_if_missing(false)
         .busy_timeout(config.busy_timeout)
         .pragma("query_only", "ON");

      let read_pool = SqlitePoolOptions::new()
         .max_connections(config.max_read_connections.max(1))
         .min_connections(0)
         .idle_timeout(Some(config.idle_timeout))
         .connect_lazy_with(read_options);

      debug!(path = %path.display(), max_readers = config.max_read_connections, "Opened database");

      Ok(Arc::new(Self {
         read_pool,
         write_conn,
         closed: AtomicBool::new(false),
         path,
      }))
   }

   /// Get a reference to the read-only connection pool.
   pub fn read_pool(&self) -> Result<&Pool<Sqlite>> {
      if self.is_closed() {
         return Err(Error::DatabaseClosed);
      }
      Ok(&self.read_pool)
   }

   /// Acquire the single write connection.
   ///
   /// Waits while another writer holds the guard.
   pub async fn acquire_writer(&self) -> Result<WriteGuard> {
      if self.is_closed() {
         return Err(Error::DatabaseClosed);
      }
      let conn = self.write_conn.acquire().await?;
      Ok(WriteGuard::new(conn))
   }

   /// Path of the database file.
   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Returns true once [`close`](Self::close) or [`remove`](Self::remove) ran.
   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::Acquire)
   }

   /// Close both pools. Further reads and writes fail with [`Error::DatabaseClosed`].
   pub async fn close(&self) -> Result<()> {
      if self.closed.swap(true, Ordering::AcqRel) {
         return Ok(());
      }
      self.read_pool.close().await;
      self.write_conn.close().await;
      debug!(path = %self.path.display(), "Closed database");
      Ok(())
   }

   /// Close the database and delete its files (main file, `-wal`, `-shm`).
   pub async fn remove(&self) -> Result<()> {
      self.close().await?;

      for suffix in ["", "-wal", "-shm"] {
         let mut file = self.path.clone().into_os_string();
         file.push(suffix);
         match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
         }
      }

      debug!(path = %self.path.display(), "Removed database files");
      Ok(())
   }
}
