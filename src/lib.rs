//! Local-first calendar data and sync layer.
//!
//! Every read and write goes to a local SQLite store first. Writes are
//! atomic units that also record a change-set in a local upload queue;
//! reads are live queries that re-run after each committed change. A
//! background [`SyncSession`] drains the queue to the backend while a
//! [`SyncStatusTracker`] turns connection signals into a presentation state.
//!
//! # Example
//!
//! ```ignore
//! use nebbler_sync::{SyncConfig, SyncLayer, ReqwestClient, queries};
//!
//! let config = SyncConfig::from_env()?;
//! let layer = SyncLayer::open(config, "nebbler.db", None).await?;
//!
//! let mut calendars = layer.watch(queries::calendars());
//! let client = ReqwestClient::new(layer.config().request_timeout)?;
//! layer.connect(client, auth.session()).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::info;

pub mod auth;
pub mod config;
pub mod connector;
pub mod crud;
pub mod decode;
mod error;
pub mod id;
pub mod mutations;
pub mod queries;
pub mod schema;
pub mod status;
pub mod store;
pub mod timestamp;

pub use auth::{AuthService, AuthSession, FileTokenStorage};
pub use config::SyncConfig;
pub use connector::{BackendConnector, Credentials, HttpClient, ReqwestClient, SyncSession};
pub use error::{Error, Result};
pub use mutations::Mutations;
pub use nebbler_conn_mgr::SqliteDatabaseConfig;
pub use queries::{LiveQuery, Query};
pub use status::{SyncState, SyncStatusInfo, SyncStatusTracker};
pub use store::{LocalStore, RemoteChange};

/// The assembled layer: store, mutations, status and the optional running
/// sync session.
pub struct SyncLayer {
   config: SyncConfig,
   store: LocalStore,
   mutations: Mutations,
   status: SyncStatusTracker,
   session: Mutex<Option<SyncSession>>,
}

impl SyncLayer {
   /// Open the local store. Nothing talks to the network until
   /// [`connect`](Self::connect).
   pub async fn open(
      config: SyncConfig,
      path: impl AsRef<Path>,
      db_config: Option<SqliteDatabaseConfig>,
   ) -> Result<Self> {
      let store = LocalStore::open(path, db_config).await?;
      Ok(Self {
         config,
         mutations: Mutations::new(store.clone()),
         store,
         status: SyncStatusTracker::new(),
         session: Mutex::new(None),
      })
   }

   pub fn config(&self) -> &SyncConfig {
      &self.config
   }

   pub fn store(&self) -> &LocalStore {
      &self.store
   }

   pub fn mutations(&self) -> &Mutations {
      &self.mutations
   }

   pub fn status(&self) -> &SyncStatusTracker {
      &self.status
   }

   pub fn watch<T: DeserializeOwned>(&self, query: Query<T>) -> LiveQuery<T> {
      query.watch(&self.store)
   }

   pub fn is_connected(&self) -> bool {
      self.session.lock().as_ref().is_some_and(SyncSession::is_active)
   }

   /// Fetch credentials and start uploading. An existing session is
   /// stopped first.
   pub async fn connect<C: HttpClient + 'static>(
      &self,
      client: C,
      auth: AuthSession,
   ) -> Result<Credentials> {
      self.disconnect().await;

      let connector = Arc::new(BackendConnector::new(self.config.clone(), client, auth));
      let session = SyncSession::connect(connector, self.store.clone(), self.status.clone()).await?;
      let credentials = session.credentials().clone();

      // Replacing drops (and aborts) a session a concurrent connect left behind
      *self.session.lock() = Some(session);
      Ok(credentials)
   }

   /// Stop uploading. Queued change-sets are kept for the next session.
   pub async fn disconnect(&self) {
      let session = self.session.lock().take();
      if let Some(session) = session {
         session.disconnect().await;
      }
   }

   /// Apply a batch of replicated rows and record a completed download.
   pub async fn apply_remote(&self, changes: Vec<RemoteChange>) -> Result<usize> {
      let applied = self.store.apply_remote(changes).await?;
      let now = OffsetDateTime::now_utc();
      self.status.modify_signals(|s| {
         s.has_synced = true;
         s.last_synced_at = Some(now);
      });
      Ok(applied)
   }

   pub async fn close(self) -> Result<()> {
      self.disconnect().await;
      self.store.close().await?;
      info!("Sync layer closed");
      Ok(())
   }
}
